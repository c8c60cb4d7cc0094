use std::path::Path;

use cloudplan_core::config::LoadOptions;
use cloudplan_core::PricingService;
use serde_json::json;

use crate::commands::{load_config, read_input, CommandResult};

const COMMAND: &str = "calculator-url";

pub fn run(options: LoadOptions, resources: &Path) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let raw = match read_input(COMMAND, resources) {
        Ok(raw) => raw,
        Err(result) => return result,
    };

    let session = PricingService::from_config(&config)
        .and_then(|service| service.calculator_session(&raw));
    match session {
        Ok(session) => CommandResult::success_with_data(
            COMMAND,
            session.url.clone(),
            Some(json!({
                "session_id": session.session_id,
                "url": session.url,
                "resources": session.estimate.resources.len(),
            })),
        ),
        Err(error) => CommandResult::from_error(COMMAND, &error),
    }
}
