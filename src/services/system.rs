//! Running external helper programs

use std::process::Output;

use tokio::process::Command;
use tracing::{debug, info};

/// Run `program` with `args`, failing on spawn errors and non-zero exits
pub async fn run_command(program: &str, args: &[&str]) -> Result<Output, String> {
    debug!("Running {} {:?}", program, args);

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("Failed to execute {}: {}", program, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            stderr.trim()
        ));
    }

    Ok(output)
}

/// Check if a helper program can be spawned at all
pub async fn check_command_available(program: &str) -> Result<(), String> {
    Command::new(program)
        .arg("--version")
        .output()
        .await
        .map_err(|_| format!("{} is not available on this system", program))?;

    info!("{} is available", program);
    Ok(())
}
