// src/utils/env.rs
use log::{debug, info, warn};
use std::path::Path;

const ENV_PATHS: [&str; 3] = [".env", ".env.local", "../.env"];

/// Loads the first `.env` file found. Variables already set in the process
/// environment take precedence over the file.
pub fn load_env() {
    let mut loaded_env = false;
    for path in ENV_PATHS.iter() {
        if Path::new(path).exists() {
            match dotenv::from_filename(path) {
                Ok(_) => {
                    info!("Loaded environment variables from {}", path);
                    loaded_env = true;
                    break;
                }
                Err(e) => warn!("Failed to load environment from {}: {}", path, e),
            }
        }
    }
    if !loaded_env {
        debug!("No .env file found, using environment variables from system");
    }
}
