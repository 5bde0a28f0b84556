use std::io::stderr;

use clap::{clap_app, crate_authors, crate_description, crate_version};
use ex::fs::read_to_string;
use tracing::info;

use livepatch::config_migration::{migrate, parse};

fn main() -> Result<(), String> {
    let matches = clap_app!(livepatch_config_migrate =>
        (version: crate_version!())
        (author: crate_authors!())
        (about: crate_description!())
        (@arg JSON: --json "Print the full result as JSON instead of just the new config")
        (@arg FILE: +required "Output of `juju config` for the old livepatch application")
    )
    .get_matches();

    tracing_subscriber::fmt().with_writer(stderr).init();

    let path = matches.value_of("FILE").unwrap_or_default();
    let content =
        read_to_string(path).map_err(|err| format!("Couldn't read {}: {}", path, err))?;

    let config = parse(content.trim())?;
    let result = migrate(&config)
        .map_err(|err| format!("Failed to map old config to new config: {}", err))?;

    if !result.removed_keys.is_empty() {
        info!(keys = ?result.removed_keys, "Options dropped, they have no equivalent");
    }
    if !result.unrecognized_keys.is_empty() {
        info!(keys = ?result.unrecognized_keys, "Options not recognized");
    }

    if matches.is_present("JSON") {
        let json = serde_json::to_string_pretty(&result)
            .map_err(|err| format!("Couldn't serialize result: {}", err))?;
        println!("{}", json);
    } else {
        println!("{}", result.new_config);
    }

    Ok(())
}
