use tracing::info;

use crate::cli::commands::LoginArgs;
use crate::io::config_io;

use super::discover_cwd;

pub fn cmd_login(args: LoginArgs) -> Result<(), Box<dyn std::error::Error>> {
    let user = args.user.trim();
    if user.is_empty() {
        return Err("user cannot be empty".into());
    }
    let ws = discover_cwd()?;
    let (_, mut doc) = config_io::read_config(&ws)?;
    config_io::set_session_user(&mut doc, user);
    config_io::write_config(&ws, &doc)?;
    info!(user, "signed in");
    println!("Signed in as {}", user);
    Ok(())
}

pub fn cmd_logout() -> Result<(), Box<dyn std::error::Error>> {
    let ws = discover_cwd()?;
    let (config, mut doc) = config_io::read_config(&ws)?;
    if config.session.user.is_none() {
        println!("Already signed out");
        return Ok(());
    }
    config_io::clear_session_user(&mut doc);
    config_io::write_config(&ws, &doc)?;
    info!("signed out");
    println!("Signed out");
    Ok(())
}
