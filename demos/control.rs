use std::env;
use std::sync::Arc;

use tuya_ir_ac::{ClimateEntity, PlatformConfig, RestoredAttributes, setup_platform};

const USAGE: &str = "usage: control <config.json> <unit> <on|off|temp N|mode M|fan F>";

#[tokio::main]
async fn main() -> tuya_ir_ac::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let (Some(config_path), Some(unit), Some(action)) = (args.get(1), args.get(2), args.get(3))
    else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let value = args.get(4);

    let config = PlatformConfig::from_path(config_path)?;
    let table = config.load_commands()?;
    println!("Loaded {} commands from {}", table.len(), config.commands_path.display());

    let entities = setup_platform(&config, Arc::clone(&table))?;
    let Some(entity) = entities.into_iter().find(|e| e.name() == unit) else {
        eprintln!("no unit named {unit}");
        std::process::exit(2);
    };
    entity.subscribe(|snapshot| {
        println!(
            "[{}] {} | fan: {} | target: {} | set-point {}\u{00b0}C",
            snapshot.unique_id,
            snapshot.hvac_mode,
            snapshot.fan_mode,
            snapshot
                .target_temperature
                .map_or_else(|| "-".to_string(), |t| format!("{t}\u{00b0}C")),
            snapshot.current_temperature,
        );
    });

    // Assume the unit is off; nothing is persisted between runs.
    entity.added_to_host(Some(&RestoredAttributes::default())).await?;
    run(&entity, action, value.map(String::as_str)).await
}

async fn run(entity: &ClimateEntity, action: &str, value: Option<&str>) -> tuya_ir_ac::Result<()> {
    let controller = entity.controller();
    match (action, value) {
        ("on", None) => controller.turn_on().await?,
        ("off", None) => controller.turn_off().await?,
        ("temp", Some(v)) => {
            let temp: f64 = v
                .parse()
                .map_err(|_| tuya_ir_ac::Error::Config(format!("not a temperature: {v}")))?;
            entity.set_temperature(Some(temp)).await?;
        }
        ("mode", Some(v)) => controller.update_mode(v.parse()?).await?,
        ("fan", Some(v)) => controller.update_fan_speed(v.parse()?).await?,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
    println!("{} is now {:?}", entity.name(), controller.state());
    Ok(())
}
