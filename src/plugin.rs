/// Plugin capability set: optional `prepare`/`post_process` hooks plus an
/// `init`/`cleanup` lifecycle (spec.md §9, "plugin system as capability
/// set"). Only the interface and registry are in scope here — concrete
/// plugins are an external collaborator's job (spec.md §1).
use crate::audio::AudioBuffer;
use crate::candidate::BeatCandidate;
use crate::error::{BeatError, Result};

/// A pipeline plugin. All hooks have a default no-op implementation so a
/// plugin can opt into exactly the capabilities it needs.
pub trait Plugin: Send + Sync {
    /// Unique name used as the registry key.
    fn name(&self) -> &str;

    /// Called once, in registration order, before the first parse.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Runs before detection, may transform the prepared audio.
    fn prepare(&mut self, audio: AudioBuffer) -> Result<AudioBuffer> {
        Ok(audio)
    }

    /// Runs after refinement and before selection, may transform the beat
    /// candidates (spec.md §4.9, post-plugin hook).
    fn post_process(&mut self, beats: Vec<BeatCandidate>) -> Result<Vec<BeatCandidate>> {
        Ok(beats)
    }

    /// Called once, in reverse registration order, on pipeline teardown.
    /// Errors are logged and swallowed by the registry (spec.md §7).
    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Ordered, name-keyed plugin registry. Frozen by `initialize()`, mirroring
/// `ParserConfig`'s freeze on first use (spec.md §9).
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
    frozen: bool,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            frozen: false,
        }
    }

    /// Register a plugin. Rejects duplicate names and registration after
    /// the registry has been frozen.
    pub fn add(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        if self.frozen {
            return Err(BeatError::AlreadyInitialized);
        }
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(BeatError::InvalidConfiguration(format!(
                "plugin '{}' is already registered",
                plugin.name()
            )));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        if self.frozen {
            return Err(BeatError::AlreadyInitialized);
        }
        let before = self.plugins.len();
        self.plugins.retain(|p| p.name() != name);
        if self.plugins.len() == before {
            return Err(BeatError::ResourceMissing(format!("plugin '{name}' not found")));
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Run every plugin's `init` in registration order, then freeze the
    /// registry against further add/remove calls.
    pub fn initialize(&mut self) -> Result<()> {
        for plugin in &mut self.plugins {
            plugin
                .init()
                .map_err(|e| BeatError::plugin(plugin.name().to_string(), e))?;
        }
        self.frozen = true;
        Ok(())
    }

    pub fn run_prepare(&mut self, mut audio: AudioBuffer) -> Result<AudioBuffer> {
        for plugin in &mut self.plugins {
            audio = plugin
                .prepare(audio)
                .map_err(|e| BeatError::plugin(plugin.name().to_string(), e))?;
        }
        Ok(audio)
    }

    pub fn run_post_process(&mut self, mut beats: Vec<BeatCandidate>) -> Result<Vec<BeatCandidate>> {
        for plugin in &mut self.plugins {
            beats = plugin
                .post_process(beats)
                .map_err(|e| BeatError::plugin(plugin.name().to_string(), e))?;
        }
        Ok(beats)
    }

    /// Run every plugin's `cleanup` in reverse registration order. Errors
    /// are logged and swallowed (spec.md §7, "plugin cleanup errors logged
    /// and swallowed").
    pub fn cleanup(&mut self) {
        for plugin in self.plugins.iter_mut().rev() {
            if let Err(err) = plugin.cleanup() {
                tracing::warn!(plugin = plugin.name(), error = %err, "plugin cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Source;

    struct CountingPlugin {
        name: String,
        prepared: usize,
    }

    impl Plugin for CountingPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn prepare(&mut self, audio: AudioBuffer) -> Result<AudioBuffer> {
            self.prepared += 1;
            Ok(audio)
        }

        fn post_process(&mut self, mut beats: Vec<BeatCandidate>) -> Result<Vec<BeatCandidate>> {
            beats.push(BeatCandidate::new(0.0, 1.0, 1.0, Source::Combined));
            Ok(beats)
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = PluginRegistry::new();
        registry
            .add(Box::new(CountingPlugin {
                name: "a".into(),
                prepared: 0,
            }))
            .unwrap();
        let err = registry
            .add(Box::new(CountingPlugin {
                name: "a".into(),
                prepared: 0,
            }))
            .unwrap_err();
        assert!(matches!(err, BeatError::InvalidConfiguration(_)));
    }

    #[test]
    fn freezes_after_initialize() {
        let mut registry = PluginRegistry::new();
        registry.initialize().unwrap();
        let err = registry
            .add(Box::new(CountingPlugin {
                name: "a".into(),
                prepared: 0,
            }))
            .unwrap_err();
        assert!(matches!(err, BeatError::AlreadyInitialized));
    }

    #[test]
    fn post_process_runs_in_registration_order() {
        let mut registry = PluginRegistry::new();
        registry
            .add(Box::new(CountingPlugin {
                name: "first".into(),
                prepared: 0,
            }))
            .unwrap();
        registry
            .add(Box::new(CountingPlugin {
                name: "second".into(),
                prepared: 0,
            }))
            .unwrap();
        let beats = registry.run_post_process(Vec::new()).unwrap();
        assert_eq!(beats.len(), 2);
    }

    #[test]
    fn list_reflects_registration_order() {
        let mut registry = PluginRegistry::new();
        registry
            .add(Box::new(CountingPlugin {
                name: "first".into(),
                prepared: 0,
            }))
            .unwrap();
        registry
            .add(Box::new(CountingPlugin {
                name: "second".into(),
                prepared: 0,
            }))
            .unwrap();
        assert_eq!(registry.list(), vec!["first", "second"]);
    }
}
