//! Check the environment.

use reelcast_common::config::AppConfig;
use reelcast_platform::capabilities::{
    all_required_available, check_capabilities, print_capability_report,
};

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Reelcast System Check");
    println!("{}", "=".repeat(50));

    match config.validate() {
        Ok(()) => println!("[OK] Configuration is valid"),
        Err(e) => println!("[FAIL] {e}"),
    }

    let capabilities = check_capabilities(config).await;
    println!();
    print_capability_report(&capabilities);

    println!();
    if all_required_available(&capabilities) {
        println!("All required capabilities are available. Reelcast is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
