//! `adm pause <id>` – pause an active download in a running `adm run`.

use anyhow::Result;

use crate::cli::control_socket;

pub async fn run_pause(id: &str) -> Result<()> {
    let path = adm_core::control::default_control_socket_path()?;
    match control_socket::send_command(&path, "pause", id).await {
        Ok(true) => println!("Pause requested for '{id}'"),
        Ok(false) => println!("No active run; pause applies to running downloads only."),
        Err(e) => {
            tracing::debug!("control socket: {e:#}");
            println!("No active run; pause applies to running downloads only.");
        }
    }
    Ok(())
}
