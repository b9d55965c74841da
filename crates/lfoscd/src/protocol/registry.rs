//! Ordered table of protocol adapters and the dispatch logic built on it.

use std::io::{BufRead, Write};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, warn};

use super::{
    CommandContext, PROTOCOL_TARGET, ProtocolAdapter, ProtocolData, ProtocolError, RawInput,
    RegistryError,
};

#[derive(Clone)]
struct Registration {
    tag: String,
    adapter: Arc<dyn ProtocolAdapter>,
}

/// Registry mapping protocol tags to adapters.
///
/// Built once at startup and shared by every listener. Lookups are
/// read-mostly; only [`add_protocol`](Self::add_protocol) takes the write
/// lock.
#[derive(Default)]
pub struct ProtocolRegistry {
    adapters: RwLock<Vec<Registration>>,
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("protocols", &self.tags())
            .finish()
    }
}

impl ProtocolRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `adapter` under its own tag.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the tag is taken.
    pub fn register(&self, adapter: Arc<dyn ProtocolAdapter>) -> Result<(), RegistryError> {
        let tag = adapter.tag().to_ascii_lowercase();
        let mut adapters = self.adapters.write().unwrap_or_else(PoisonError::into_inner);
        if adapters.iter().any(|entry| entry.tag == tag) {
            return Err(RegistryError::Duplicate { protocol: tag });
        }
        adapters.push(Registration { tag, adapter });
        Ok(())
    }

    /// Registers `adapter` under `tag`, replacing any adapter already bound to
    /// it in place so recognition order is kept.
    pub fn add_protocol(&self, tag: &str, adapter: Arc<dyn ProtocolAdapter>) {
        let tag = tag.to_ascii_lowercase();
        let mut adapters = self.adapters.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = adapters.iter_mut().find(|entry| entry.tag == tag) {
            entry.adapter = adapter;
        } else {
            adapters.push(Registration { tag, adapter });
        }
    }

    /// Registered tags in recognition order.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|entry| entry.tag).collect()
    }

    /// Case-insensitive adapter lookup.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<Arc<dyn ProtocolAdapter>> {
        let adapters = self.adapters.read().unwrap_or_else(PoisonError::into_inner);
        adapters
            .iter()
            .find(|entry| entry.tag.eq_ignore_ascii_case(tag))
            .map(|entry| Arc::clone(&entry.adapter))
    }

    /// Resolves `raw` into a refined command, or `None` when it is not a
    /// command for any registered protocol.
    #[must_use]
    pub fn resolve(&self, raw: &RawInput<'_>) -> Option<ProtocolData> {
        self.resolve_request(raw).ok()
    }

    /// Resolves `raw`, explaining why resolution failed.
    ///
    /// Adapters are tried in registration order and the first recogniser that
    /// accepts the input wins. The result is refined by the adapter owning the
    /// command's protocol, which need not be the recogniser.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Unrecognized`] when no grammar matches and
    /// [`ProtocolError::UnknownProtocol`] when the command names an
    /// unregistered protocol.
    pub fn resolve_request(&self, raw: &RawInput<'_>) -> Result<ProtocolData, ProtocolError> {
        let recognized = self
            .snapshot()
            .into_iter()
            .find_map(|entry| entry.adapter.recognize(raw));
        match recognized {
            Some(data) => self.refine(data),
            None => Err(ProtocolError::Unrecognized {
                input: raw.to_string(),
            }),
        }
    }

    /// Resolves `raw` using only the recogniser registered under `tag`.
    ///
    /// # Errors
    ///
    /// As [`resolve_request`](Self::resolve_request); an unregistered `tag`
    /// reports [`ProtocolError::UnknownProtocol`].
    pub fn resolve_with(&self, tag: &str, raw: &RawInput<'_>) -> Result<ProtocolData, ProtocolError> {
        let adapter = self.adapter_for(tag)?;
        match adapter.recognize(raw) {
            Some(data) => self.refine(data),
            None => Err(ProtocolError::Unrecognized {
                input: raw.to_string(),
            }),
        }
    }

    /// Delivers `data` through the adapter owning its protocol.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownProtocol`] for an unregistered protocol
    /// and otherwise whatever the adapter reports.
    pub fn dispatch(&self, data: &ProtocolData) -> Result<String, ProtocolError> {
        let adapter = self.adapter_for(data.protocol_id())?;
        debug!(target: PROTOCOL_TARGET, command = %data, "dispatching command");
        adapter.process(data, self)
    }

    /// Resolves and delivers `raw` in one step.
    ///
    /// # Errors
    ///
    /// Propagates resolution and delivery failures.
    pub fn resolve_and_dispatch(&self, raw: &RawInput<'_>) -> Result<String, ProtocolError> {
        let data = self.resolve_request(raw)?;
        self.dispatch(&data)
    }

    /// Runs an administrative command of protocol `tag`.
    ///
    /// Returns -1 without side effects when `tag` is not registered. A
    /// failing command is reported on `output` and also yields -1.
    pub fn run_command(
        &self,
        tag: &str,
        command: &str,
        args: &[String],
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> i32 {
        let Some(adapter) = self.get(tag) else {
            warn!(target: PROTOCOL_TARGET, protocol = tag, "unknown protocol for command");
            return -1;
        };
        let mut context = CommandContext {
            registry: self,
            input,
            output,
        };
        match adapter.run_local_command(command, args, &mut context) {
            Ok(code) => code,
            Err(failure) => {
                error!(
                    target: PROTOCOL_TARGET,
                    protocol = tag,
                    command,
                    error = %failure.report(),
                    "command failed"
                );
                let _ = context.say(&format!("error: {}", failure.report()));
                -1
            }
        }
    }

    fn refine(&self, data: ProtocolData) -> Result<ProtocolData, ProtocolError> {
        let adapter = self.adapter_for(data.protocol_id())?;
        Ok(adapter.configure(data))
    }

    fn adapter_for(&self, tag: &str) -> Result<Arc<dyn ProtocolAdapter>, ProtocolError> {
        self.get(tag).ok_or_else(|| ProtocolError::UnknownProtocol {
            protocol: tag.to_owned(),
        })
    }

    fn snapshot(&self) -> Vec<Registration> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
