//! HTTP bridge adapter.
//!
//! Request paths take the form `/<protocol>/<target>/<operation>[/<args>]`.
//! The target and operation stay percent-encoded until the owning adapter
//! refines them; the optional argument segment is decoded and tokenized here.
//! The bridge only relays, and refuses to relay to itself.

use super::ADAPTER_TARGET;
use crate::protocol::{
    ProtocolAdapter, ProtocolData, ProtocolError, ProtocolRegistry, RawInput, decode, tokenize,
};

/// Tag of the HTTP bridge.
pub const BRIDGE_TAG: &str = "http";

/// Adapter mapping request paths onto other protocols.
#[derive(Debug, Default, Clone, Copy)]
pub struct BridgeAdapter;

impl ProtocolAdapter for BridgeAdapter {
    fn tag(&self) -> &'static str {
        BRIDGE_TAG
    }

    fn recognize(&self, raw: &RawInput<'_>) -> Option<ProtocolData> {
        let text = raw.as_text()?.trim();
        let path = text.split_once('?').map_or(text, |(path, _)| path);
        let mut parts = path.strip_prefix('/')?.splitn(4, '/');
        let protocol = parts.next().filter(|part| !part.is_empty())?;
        let target = parts.next().filter(|part| !part.is_empty())?;
        let operation = parts.next().filter(|part| !part.is_empty())?;
        let arguments = parts
            .next()
            .map(|raw_args| tokenize(&decode(raw_args)))
            .unwrap_or_default();
        Some(ProtocolData::new(
            decode(protocol),
            target,
            operation,
            arguments,
        ))
    }

    fn process(
        &self,
        data: &ProtocolData,
        registry: &ProtocolRegistry,
    ) -> Result<String, ProtocolError> {
        if data.protocol_id() == BRIDGE_TAG {
            return Err(ProtocolError::SelfRelay {
                protocol: BRIDGE_TAG.to_owned(),
            });
        }
        tracing::debug!(target: ADAPTER_TARGET, command = %data, "bridging request");
        registry.dispatch(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Argument;
    use rstest::rstest;

    #[test]
    fn paths_split_into_protocol_target_and_operation() {
        let data = BridgeAdapter
            .recognize(&RawInput::Text("/lf/localhost:3300/foo%20bar%201234"))
            .expect("path recognised");
        assert_eq!(data.protocol_id(), "lf");
        assert_eq!(data.target(), "localhost:3300");
        assert_eq!(data.operation(), "foo%20bar%201234");
        assert!(data.arguments().is_empty());
    }

    #[test]
    fn fourth_segment_is_decoded_into_arguments() {
        let data = BridgeAdapter
            .recognize(&RawInput::Text("/osc/h:1/cue/go%201%20%22a%20b%22?callback=cb"))
            .expect("path recognised");
        assert_eq!(data.operation(), "cue");
        assert_eq!(
            data.arguments(),
            &[
                Argument::Text(String::from("go")),
                Argument::Int(1),
                Argument::Text(String::from("a b")),
            ]
        );
    }

    #[rstest]
    #[case("/lf/localhost:3300")]
    #[case("/lf//foo")]
    #[case("lf/localhost:3300/foo")]
    #[case("/")]
    fn incomplete_paths_are_not_recognised(#[case] path: &str) {
        assert!(BridgeAdapter.recognize(&RawInput::Text(path)).is_none());
    }

    #[test]
    fn relaying_to_the_bridge_itself_is_refused() {
        let data = ProtocolData::new("http", "x", "y", Vec::new());
        let error = BridgeAdapter
            .process(&data, &ProtocolRegistry::new())
            .expect_err("self relay refused");
        assert!(matches!(error, ProtocolError::SelfRelay { .. }));
    }

    #[test]
    fn unknown_protocols_are_reported() {
        let data = ProtocolData::new("foo", "default", "bar", Vec::new());
        let error = BridgeAdapter
            .process(&data, &ProtocolRegistry::new())
            .expect_err("foo is unknown");
        assert!(matches!(error, ProtocolError::UnknownProtocol { .. }));
    }
}
