use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tuya_ir_ac::{
    AcController, ClimateEntity, ClimateFeatures, CommandTable, EntitySnapshot, FanMode,
    FanSpeed, Gateway, GatewayKind, HvacMode, Mode, PlatformConfig, RestoredAttributes,
    Temperature, TemperatureUnit, setup_platform,
};

struct FakeGateway {
    sent: Arc<Mutex<Vec<String>>>,
    set_up: bool,
}

#[async_trait]
impl Gateway for FakeGateway {
    async fn setup(&mut self) -> tuya_ir_ac::Result<()> {
        self.set_up = true;
        Ok(())
    }

    async fn send(&mut self, command_id: &str) -> tuya_ir_ac::Result<()> {
        if !self.set_up {
            return Err(tuya_ir_ac::Error::NotSetUp);
        }
        self.sent.lock().unwrap().push(command_id.to_string());
        Ok(())
    }

    fn kind(&self) -> GatewayKind {
        GatewayKind::Local
    }
}

fn table() -> Arc<CommandTable> {
    let mut builder = CommandTable::builder("power");
    for mode in Mode::ALL {
        for fan in FanSpeed::ALL {
            for temp in Temperature::MIN..=Temperature::MAX {
                let t = Temperature::new(temp.into()).unwrap();
                builder = builder.code(mode, fan, t, format!("{mode}-{fan}-{temp}"));
            }
        }
    }
    Arc::new(builder.build())
}

struct Harness {
    entity: ClimateEntity<FakeGateway>,
    sent: Arc<Mutex<Vec<String>>>,
    snapshots: Arc<Mutex<Vec<EntitySnapshot>>>,
}

impl Harness {
    fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    fn snapshots(&self) -> Vec<EntitySnapshot> {
        self.snapshots.lock().unwrap().clone()
    }
}

async fn added_entity(last: Option<&RestoredAttributes>) -> Harness {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let gateway = FakeGateway {
        sent: Arc::clone(&sent),
        set_up: false,
    };
    let controller = AcController::builder("Living Room", gateway, table())
        .build()
        .unwrap();
    let entity = ClimateEntity::new(Arc::new(controller)).with_settle_delay(Duration::ZERO);

    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&snapshots);
    entity.subscribe(move |snapshot| sink.lock().unwrap().push(snapshot.clone()));

    entity.added_to_host(last).await.expect("entity should be added");
    Harness {
        entity,
        sent,
        snapshots,
    }
}

#[tokio::test]
async fn static_properties() {
    let h = added_entity(None).await;
    let e = &h.entity;
    assert_eq!(e.name(), "Living Room");
    assert_eq!(e.unique_id(), "climate Living Room");
    assert!(!e.should_poll());
    assert_eq!(e.min_temp(), 16);
    assert_eq!(e.max_temp(), 30);
    assert_eq!(e.target_temperature_step(), 1);
    assert_eq!(e.temperature_unit(), TemperatureUnit::Celsius);
    assert_eq!(e.hvac_modes().len(), 6);
    assert!(e.fan_modes().contains(&FanMode::Auto));
    assert!(e.supported_features().contains(ClimateFeatures::TARGET_TEMPERATURE));
    assert!(e.supported_features().contains(ClimateFeatures::FAN_MODE));
}

#[tokio::test]
async fn off_unit_reports_off_and_no_target() {
    let h = added_entity(None).await;
    let e = &h.entity;
    assert_eq!(e.hvac_mode(), HvacMode::Off);
    assert_eq!(e.fan_mode(), FanMode::Off);
    assert_eq!(e.target_temperature(), None);
    assert_eq!(e.current_temperature(), 25);

    let attrs = e.extra_state_attributes();
    assert!(!attrs.internal_is_on);
    assert_eq!(attrs.internal_mode, Mode::Cool);
    assert_eq!(attrs.internal_fan_speed, FanSpeed::Low);
    assert_eq!(attrs.internal_temp.celsius(), 25);
}

#[tokio::test]
async fn set_hvac_mode_turns_on_and_notifies() {
    let h = added_entity(None).await;

    h.entity.set_hvac_mode(HvacMode::Heat).await.unwrap();
    assert_eq!(h.sent(), vec!["power", "heat-low-25"]);
    assert_eq!(h.entity.hvac_mode(), HvacMode::Heat);
    assert_eq!(h.entity.fan_mode(), FanMode::Low);
    assert_eq!(h.entity.target_temperature(), Some(25));

    let snapshots = h.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].hvac_mode, HvacMode::Heat);
    assert!(snapshots[0].attributes.internal_is_on);

    h.entity.set_hvac_mode(HvacMode::HeatCool).await.unwrap();
    assert_eq!(h.sent().last().unwrap(), "auto-low-25");

    h.entity.set_hvac_mode(HvacMode::Off).await.unwrap();
    assert_eq!(h.sent().last().unwrap(), "power");
    assert_eq!(h.entity.hvac_mode(), HvacMode::Off);
    assert_eq!(h.snapshots().len(), 3);
}

#[tokio::test]
async fn set_temperature_truncates_and_ignores_none() {
    let h = added_entity(None).await;

    h.entity.set_temperature(None).await.unwrap();
    assert!(h.sent().is_empty());
    assert!(h.snapshots().is_empty());

    h.entity.set_temperature(Some(22.7)).await.unwrap();
    assert_eq!(h.sent(), vec!["power", "cool-low-22"]);
    assert_eq!(h.entity.target_temperature(), Some(22));

    let err = h.entity.set_temperature(Some(31.0)).await.unwrap_err();
    assert!(matches!(err, tuya_ir_ac::Error::Validation(_)));
}

#[tokio::test]
async fn fan_mode_off_is_ignored() {
    let h = added_entity(None).await;

    h.entity.set_fan_mode(FanMode::Off).await.unwrap();
    assert!(h.sent().is_empty());

    h.entity.set_fan_mode(FanMode::High).await.unwrap();
    assert_eq!(h.sent(), vec!["power", "cool-high-25"]);
    assert_eq!(h.entity.fan_mode(), FanMode::High);
}

#[tokio::test]
async fn restores_persisted_attributes() {
    let last: RestoredAttributes = serde_json::from_value(serde_json::json!({
        "internal_is_on": true,
        "internal_mode": "dry",
        "internal_temp": 21
    }))
    .unwrap();
    let h = added_entity(Some(&last)).await;

    let state = h.entity.controller().state();
    assert!(state.is_on());
    assert_eq!(state.mode(), Mode::Dry);
    assert_eq!(state.fan_speed(), FanSpeed::Low);
    assert_eq!(state.temp().celsius(), 21);
    assert_eq!(h.entity.hvac_mode(), HvacMode::Dry);
    assert!(h.sent().is_empty());
}

#[tokio::test]
async fn unusable_persisted_attributes_fall_back_to_defaults() {
    let last = RestoredAttributes {
        internal_is_on: Some(true),
        internal_mode: Some("heat".to_string()),
        internal_fan_speed: Some("turbo".to_string()),
        internal_temp: Some(22),
    };
    let h = added_entity(Some(&last)).await;
    assert!(!h.entity.controller().is_on());
    assert_eq!(h.entity.controller().mode(), Mode::Cool);

    h.entity.set_hvac_mode(HvacMode::Cool).await.unwrap();
    assert_eq!(h.sent(), vec!["power", "cool-low-25"]);
}

#[tokio::test]
async fn actions_wait_for_the_settle_delay() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let gateway = FakeGateway {
        sent: Arc::clone(&sent),
        set_up: false,
    };
    let controller = AcController::builder("Den", gateway, table()).build().unwrap();
    let entity =
        ClimateEntity::new(Arc::new(controller)).with_settle_delay(Duration::from_millis(50));
    entity.added_to_host(None).await.unwrap();

    let started = Instant::now();
    entity.set_hvac_mode(HvacMode::Cool).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test]
async fn listeners_can_subscribe_from_a_notification() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let gateway = FakeGateway {
        sent: Arc::clone(&sent),
        set_up: false,
    };
    let controller = AcController::builder("Loft", gateway, table()).build().unwrap();
    let entity =
        Arc::new(ClimateEntity::new(Arc::new(controller)).with_settle_delay(Duration::ZERO));
    entity.added_to_host(None).await.unwrap();

    let late_calls = Arc::new(AtomicUsize::new(0));
    let subscribed = Arc::new(AtomicBool::new(false));
    {
        let weak = Arc::downgrade(&entity);
        let late_calls = Arc::clone(&late_calls);
        entity.subscribe(move |_| {
            if subscribed.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(entity) = weak.upgrade() {
                let late_calls = Arc::clone(&late_calls);
                entity.subscribe(move |_| {
                    late_calls.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
    }

    tokio::time::timeout(Duration::from_secs(2), entity.set_hvac_mode(HvacMode::Cool))
        .await
        .expect("notification should not block")
        .unwrap();
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);

    entity.set_fan_mode(FanMode::High).await.unwrap();
    assert_eq!(late_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn setup_platform_builds_one_entity_per_unit() {
    let config: PlatformConfig = r#"{
        "acs": [
            { "name": "Bedroom", "tuya_ir_device_id": "dev1",
              "tuya_device_local_key": "0123456789abcdef", "tuya_device_ip": "192.168.1.50" },
            { "tuya_region": "us", "tuya_api_key": "key", "tuya_api_secret": "secret",
              "tuya_infrared_id": "ir1", "tuya_remote_id": "rm1" }
        ]
    }"#
    .parse()
    .unwrap();

    let entities = setup_platform(&config, table()).unwrap();
    assert_eq!(entities.len(), 2);
    assert_eq!(entities[0].unique_id(), "climate Bedroom");
    assert_eq!(entities[0].controller().gateway_kind(), GatewayKind::Local);
    assert_eq!(entities[1].name(), "Tuya IR AC");
    assert_eq!(entities[1].controller().gateway_kind(), GatewayKind::Cloud);
    assert!(entities[1].controller().profile().clamp.is_some());
}
