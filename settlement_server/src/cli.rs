use std::{env, env::VarError};

/// There's no real CLI for the server. Any argument prints the help text and the current configuration.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // ASP_HMAC_SECRET is deliberately absent
    const DISPLAY_ENVS: [&str; 12] = [
        "RUST_LOG",
        "ASP_HOST",
        "ASP_PORT",
        "ASP_DATABASE_URL",
        "ASP_MAX_CONNECTIONS",
        "ASP_HMAC_CHECKS",
        "ASP_WEBHOOK_IP_WHITELIST",
        "ASP_USE_X_FORWARDED_FOR",
        "ASP_USE_FORWARDED",
        "ASP_POINTS_ORDER_SUCCESS",
        "ASP_POINTS_ITEM_SOLD",
        "ASP_POINTS_NEW_CUSTOMER",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
