//! Configuration loader.
//!
//! Looks for a configuration file in some well known places and loads it.
//! The file is a text file of Key Value pairs, separated by a single
//! space. Unrecognized keys will be ignored.
//!
//! Recognized keys:
//! * StoragePath - directory where tables and scalars persist themselves.
//!   Compulsory when a configuration file is present; the loader panics
//!   if a file exists but does not name it.
//!
//! With no configuration file at all, the current directory is used and a
//! warning is logged, so the demonstration binary and tests run without
//! any setup.

use log::{debug, error, warn};
use std::fs::{exists, read_to_string};

pub struct Config {
    pub storage_path: String,
}

const CONF_FILES: [&str; 3] = [
    "/etc/snmp-row-engine/snmp-row-engine.conf",
    "~/.snmp-row-engine.conf",
    ".snmp-row-engine.conf",
];

impl Config {
    fn from_file(filename: &str) -> Self {
        let mut storage_path = "".to_string();
        let mut got_storage = false;
        for line in read_to_string(filename).unwrap().lines() {
            let parts: Vec<&str> = line.splitn(2, ' ').collect();
            if parts.len() < 2 {
                continue;
            }
            match parts[0] {
                "StoragePath" => {
                    storage_path = parts[1].to_string();
                    got_storage = true;
                }
                _ => {}
            }
        }
        if got_storage {
            debug!("All compulsory values found");
        } else {
            error!("StoragePath not found in config file");
            panic!("Missing essential keys in config file");
        }
        Config { storage_path }
    }

    pub fn load() -> Self {
        for name in CONF_FILES {
            let good = exists(name);
            if good.is_ok() && good.unwrap() {
                return Config::from_file(name);
            }
        }
        warn!("No configuration file found, storing in current directory");
        Config {
            storage_path: ".".to_string(),
        }
    }
}
