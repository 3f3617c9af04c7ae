//! Inbound command handling for a node
//!
//! Parses each chat message addressed to this deployment and dispatches it
//! against the device registry. Every failure is a structured error the
//! caller turns into an err:: reply plus an error-sink row; nothing here
//! may take the message loop down.

use crate::devices::FleetResult;
use crate::registry::DeviceRegistry;
use caldera_core::{command, tag, ControlError, Message};

/// What the node should do after handling a message
#[derive(Debug)]
pub enum NodeReply {
    /// Command executed, nothing further to send
    Done,
    /// Fleet command executed with per-host outcomes
    FleetResults(Vec<FleetResult>),
    /// Liveness pull: publish a fresh stats snapshot now
    StatPull,
    /// Message is not for the command handler (controller chatter, stats echo)
    Ignored,
}

pub fn handle_message(
    registry: &DeviceRegistry,
    message: &Message,
) -> Result<NodeReply, ControlError> {
    match message.type_tag() {
        tag::COMMAND => handle_command(registry, message),
        tag::STATPULL => Ok(NodeReply::StatPull),
        _ => Ok(NodeReply::Ignored),
    }
}

fn handle_command(
    registry: &DeviceRegistry,
    message: &Message,
) -> Result<NodeReply, ControlError> {
    let Some(command_type) = message.field(1) else {
        return Err(ControlError::InvalidProtocol(
            "cmd msg received but no command specified".to_string(),
        ));
    };

    match command_type {
        command::CHANGE_STATE => {
            // cmd::chng::<device>,<value>[,<speed>]
            let args = message.args();
            if args.len() < 2 {
                return Err(ControlError::InvalidProtocol(format!(
                    "cmd chng received but only {} arguments specified",
                    args.len()
                )));
            }
            registry.dispatch_change(&args[0], &args[1])?;
            Ok(NodeReply::Done)
        }
        command::FUNCTION => {
            // cmd::func::<function>::<params,comma,separated>
            let Some(function_name) = message.field(2).filter(|name| !name.is_empty()) else {
                return Err(ControlError::InvalidProtocol(
                    "cmd func received no function name specified".to_string(),
                ));
            };
            let params: Vec<String> = match message.field(3) {
                Some(raw) => raw.split(',').map(str::to_string).collect(),
                None => Vec::new(),
            };
            let results = registry.dispatch_function(function_name, &params)?;
            Ok(NodeReply::FleetResults(results))
        }
        _ => Ok(NodeReply::Ignored),
    }
}

/// err::<code>::<name>::<detail> reply for the originating channel
pub fn error_reply(error: &ControlError) -> String {
    Message::from_fields(vec![
        tag::ERROR.to_string(),
        error.code().to_string(),
        error.to_string(),
    ])
    .encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{Device, MemoryPin, RelaySwitch, Switchable};
    use caldera_devkit::ChatMessageBuilder;
    use std::collections::HashMap;

    fn registry() -> DeviceRegistry {
        let mut devices = HashMap::new();
        devices.insert(
            "pump1".to_string(),
            Device::Switch(Box::new(RelaySwitch::new("pump1", false, Box::new(MemoryPin::default())))),
        );
        DeviceRegistry::new(devices)
    }

    #[test]
    fn test_change_command_executes_on_registry() {
        let registry = registry();
        let message = Message::parse(&ChatMessageBuilder::change("pump1", "on"));

        let reply = handle_message(&registry, &message).unwrap();
        assert!(matches!(reply, NodeReply::Done));
        let Some(Device::Switch(pump)) = registry.get("pump1") else {
            panic!("pump missing")
        };
        assert!(pump.get_state().unwrap());
    }

    #[test]
    fn test_change_command_with_too_few_arguments() {
        let registry = registry();
        let message = Message::parse("cmd::chng::pump1");
        let result = handle_message(&registry, &message);
        assert!(matches!(result, Err(ControlError::InvalidProtocol(_))));
    }

    #[test]
    fn test_bare_cmd_is_invalid() {
        let registry = registry();
        let result = handle_message(&registry, &Message::parse("cmd"));
        assert!(matches!(result, Err(ControlError::InvalidProtocol(_))));
    }

    #[test]
    fn test_func_without_name_is_invalid() {
        let registry = registry();
        let result = handle_message(&registry, &Message::parse("cmd::func"));
        assert!(matches!(result, Err(ControlError::InvalidProtocol(_))));
    }

    #[test]
    fn test_func_without_fleet_device() {
        let registry = registry();
        let result = handle_message(&registry, &Message::parse("cmd::func::miner::start"));
        assert!(matches!(result, Err(ControlError::DeviceNotFound(_))));
    }

    #[test]
    fn test_statpull_requests_snapshot() {
        let registry = registry();
        let reply = handle_message(&registry, &Message::parse("stpul")).unwrap();
        assert!(matches!(reply, NodeReply::StatPull));
    }

    #[test]
    fn test_unrelated_tags_are_ignored() {
        let registry = registry();
        let reply = handle_message(&registry, &Message::parse(r#"stats::{"a": 1}"#)).unwrap();
        assert!(matches!(reply, NodeReply::Ignored));
        let reply = handle_message(&registry, &Message::parse("cmd::read::pump1")).unwrap();
        assert!(matches!(reply, NodeReply::Ignored));
    }

    #[test]
    fn test_error_reply_is_protocol_encoded() {
        let error = ControlError::DeviceNotFound("device pump9 not found".to_string());
        let reply = error_reply(&error);
        assert!(reply.starts_with("err::404::"));
        assert!(reply.contains("pump9"));
    }
}
