//! The plugin registry (§3, §4.E): a dense, index-stable array keyed by
//! small integer id, grounded on `CarlaEngine`'s plugin-management methods
//! (`addPlugin`/`removePlugin`/`clonePlugin`/`replacePlugin`/`switchPlugins`)
//! in `CarlaEngine.hpp`.

use carla_core::{Error, Result};
use carla_plugin::PluginWrapper;

use crate::client::EngineClient;

/// Ordered, bounded collection of loaded plugins (§3, §4.E).
pub struct PluginRegistry {
    slots: Vec<Box<dyn PluginWrapper>>,
    /// One [`EngineClient`] per slot, index-aligned (§4.C): the per-plugin
    /// port/activation handle the driver would hand out in a real topology.
    clients: Vec<EngineClient>,
    /// Whether new clients are built with a fixed port topology (rack/
    /// single/multiple-client modes) or an open one (patchbay).
    fixed_topology: bool,
    max_count: usize,
    /// Set by `replace(id)`; consumed by the next `add`.
    earmark: Option<u32>,
    last_error: Option<String>,
}

impl PluginRegistry {
    pub fn new(max_count: usize, fixed_topology: bool) -> Self {
        Self {
            slots: Vec::new(),
            clients: Vec::new(),
            fixed_topology,
            max_count,
            earmark: None,
            last_error: None,
        }
    }

    pub fn client(&self, id: u32) -> Option<&EngineClient> {
        self.clients.get(id as usize)
    }

    pub fn client_mut(&mut self, id: u32) -> Option<&mut EngineClient> {
        self.clients.get_mut(id as usize)
    }

    /// Mirrors each plugin's `PluginState::active` (set by the rack/patchbay
    /// processor's `activate`/`deactivate` calls) onto its `EngineClient`
    /// (§4.C), so the client-facing activation state never drifts from what
    /// the processor has actually observed. `activate`/`deactivate` on
    /// `EngineClient` only fail when already in the target state, which
    /// can't happen here since each call is gated on the opposite state.
    pub fn sync_client_states(&mut self) {
        for (slot, client) in self.slots.iter().zip(self.clients.iter_mut()) {
            let active = slot.state().active;
            if active && !client.is_active() {
                let _ = client.activate();
            } else if !active && client.is_active() {
                let _ = client.deactivate();
            }
        }
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn get(&self, id: u32) -> Option<&dyn PluginWrapper> {
        self.slots.get(id as usize).map(|b| b.as_ref())
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Box<dyn PluginWrapper>> {
        self.slots.get_mut(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Box<dyn PluginWrapper>> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn PluginWrapper>> {
        self.slots.iter_mut()
    }

    /// Exposes the underlying slot array for the rack processor, which
    /// needs to walk plugins in registry order sharing one bus (§4.G).
    pub fn slots_mut(&mut self) -> &mut [Box<dyn PluginWrapper>] {
        &mut self.slots
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn set_last_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "registry operation failed");
        self.last_error = Some(message);
    }

    fn name_is_taken(&self, name: &str, excluding: Option<u32>) -> bool {
        self.slots.iter().enumerate().any(|(i, p)| {
            excluding.map(|id| id as usize != i).unwrap_or(true) && p.name() == name
        })
    }

    /// Derives a name unique across the registry by appending `" (2)"`,
    /// `" (3)"`, … on collision (§4.E).
    fn unique_name(&self, requested: &str, excluding: Option<u32>) -> String {
        if !self.name_is_taken(requested, excluding) {
            return requested.to_string();
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{requested} ({suffix})");
            if !self.name_is_taken(&candidate, excluding) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Loads a plugin via `loader` (format-appropriate construction happens
    /// outside the registry) and installs it at the lowest free id, or the
    /// id previously earmarked by [`Self::replace`] (§4.E). On failure the
    /// earmark is cleared and the registry is left untouched (§8 scenario 5).
    pub fn add(
        &mut self,
        requested_name: &str,
        loader: impl FnOnce(u32) -> Result<Box<dyn PluginWrapper>>,
    ) -> Result<u32> {
        let id = self.earmark.take().unwrap_or(self.slots.len() as u32);

        if id as usize >= self.max_count {
            let err = Error::Capacity("plugin registry is full".into());
            self.set_last_error(err.to_string());
            return Err(err);
        }

        let mut plugin = match loader(id) {
            Ok(plugin) => plugin,
            Err(err) => {
                self.set_last_error(err.to_string());
                return Err(err);
            }
        };

        let unique = self.unique_name(requested_name, None);
        plugin.state_mut().metadata.name = unique;

        if (id as usize) < self.slots.len() {
            self.slots[id as usize] = plugin;
            self.clients[id as usize] = EngineClient::new(self.fixed_topology);
        } else {
            self.slots.push(plugin);
            self.clients.push(EngineClient::new(self.fixed_topology));
        }

        tracing::debug!(id, "plugin added");
        Ok(id)
    }

    /// Compacts ids above `id` downward so the id space stays dense (§4.E).
    /// The caller is responsible for having already quiesced the RT thread
    /// for this plugin (§5); the registry itself performs no waiting.
    pub fn remove(&mut self, id: u32) -> Result<()> {
        if id as usize >= self.slots.len() {
            let err = Error::InvalidArgument(format!("no plugin at id {id}"));
            self.set_last_error(err.to_string());
            return Err(err);
        }
        self.slots.remove(id as usize);
        self.clients.remove(id as usize);
        tracing::debug!(id, "plugin removed");
        Ok(())
    }

    /// Removes every plugin, highest id first, as §4.E specifies.
    pub fn remove_all(&mut self) {
        while let Some(id) = self.slots.len().checked_sub(1) {
            self.slots.remove(id);
            self.clients.remove(id);
        }
        self.earmark = None;
    }

    pub fn rename(&mut self, id: u32, new_name: &str) -> Result<String> {
        if id as usize >= self.slots.len() {
            let err = Error::InvalidArgument(format!("no plugin at id {id}"));
            self.set_last_error(err.to_string());
            return Err(err);
        }
        let unique = self.unique_name(new_name, Some(id));
        self.slots[id as usize].state_mut().metadata.name = unique.clone();
        Ok(unique)
    }

    /// Adds a new plugin with identical metadata, parameter values, program
    /// and custom data (§4.E).
    pub fn clone_plugin(&mut self, id: u32) -> Result<u32> {
        let source = self
            .get(id)
            .ok_or_else(|| Error::InvalidArgument(format!("no plugin at id {id}")))?;
        let new_id = self.slots.len() as u32;
        if new_id as usize >= self.max_count {
            let err = Error::Capacity("plugin registry is full".into());
            self.set_last_error(err.to_string());
            return Err(err);
        }
        let mut cloned = source.clone_wrapper(new_id)?;
        let unique = self.unique_name(cloned.name(), None);
        cloned.state_mut().metadata.name = unique;
        self.slots.push(cloned);
        self.clients.push(EngineClient::new(self.fixed_topology));
        Ok(new_id)
    }

    /// Marks `id` as pending; the next `add` reuses that id (§4.E).
    pub fn replace(&mut self, id: u32) -> Result<()> {
        if id as usize >= self.slots.len() {
            let err = Error::InvalidArgument(format!("no plugin at id {id}"));
            self.set_last_error(err.to_string());
            return Err(err);
        }
        self.earmark = Some(id);
        Ok(())
    }

    /// Rebuilds `id` in place for a new `sample_rate`/`block_size` (§4.D,
    /// §9). Formats that can absorb the change without a rebuild
    /// (`PluginWrapper::supports_sample_rate_change`) just get `init_buffers`
    /// called again; the rest are replaced via `reinit_for_sample_rate`,
    /// which carries over program/parameter/custom-data state the same way
    /// `clone_wrapper` does. The caller is responsible for having already
    /// quiesced the RT thread for this plugin (§5).
    pub fn reinit_for_sample_rate(&mut self, id: u32, sample_rate: f64, block_size: usize) -> Result<()> {
        let slot = self
            .slots
            .get_mut(id as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("no plugin at id {id}")))?;
        if slot.supports_sample_rate_change() {
            slot.init_buffers(block_size);
            return Ok(());
        }
        let rebuilt = match slot.reinit_for_sample_rate(id, sample_rate) {
            Ok(rebuilt) => rebuilt,
            Err(err) => {
                self.set_last_error(err.to_string());
                return Err(err);
            }
        };
        self.slots[id as usize] = rebuilt;
        self.slots[id as usize].init_buffers(block_size);
        Ok(())
    }

    /// Only legal when both ids exist and both plugins are disabled (§4.E,
    /// §8 scenario 4); exchanges their registry slots atomically.
    pub fn swap(&mut self, a: u32, b: u32) -> Result<()> {
        let (a_idx, b_idx) = (a as usize, b as usize);
        if a_idx >= self.slots.len() || b_idx >= self.slots.len() {
            let err = Error::InvalidArgument("swap id out of range".into());
            self.set_last_error(err.to_string());
            return Err(err);
        }
        if self.slots[a_idx].is_enabled() || self.slots[b_idx].is_enabled() {
            let err = Error::InvalidState("cannot swap enabled plugins".into());
            self.set_last_error(err.to_string());
            return Err(err);
        }
        self.slots.swap(a_idx, b_idx);
        self.slots[a_idx].set_id(a);
        self.slots[b_idx].set_id(b);
        self.clients.swap(a_idx, b_idx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carla_plugin::{failing_loader, GainPlugin, PassthroughPlugin};

    fn gain_loader(name: &'static str) -> impl FnOnce(u32) -> Result<Box<dyn PluginWrapper>> {
        move |id| Ok(Box::new(GainPlugin::new(id, name)))
    }

    #[test]
    fn sync_client_states_mirrors_plugin_active_flag() {
        let mut registry = PluginRegistry::new(8, true);
        let id = registry.add("amp", gain_loader("amp")).unwrap();
        assert!(!registry.client(id).unwrap().is_active());

        registry.get_mut(id).unwrap().activate();
        registry.sync_client_states();
        assert!(registry.client(id).unwrap().is_active());

        registry.get_mut(id).unwrap().deactivate();
        registry.sync_client_states();
        assert!(!registry.client(id).unwrap().is_active());
    }

    #[test]
    fn add_assigns_dense_ids() {
        let mut registry = PluginRegistry::new(8, true);
        let id0 = registry.add("amp", gain_loader("amp")).unwrap();
        let id1 = registry.add("amp2", gain_loader("amp2")).unwrap();
        assert_eq!(id0, 0);
        assert_eq!(id1, 1);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn duplicate_name_gets_numeric_suffix() {
        let mut registry = PluginRegistry::new(8, true);
        registry.add("amp", gain_loader("amp")).unwrap();
        registry.add("amp", gain_loader("amp")).unwrap();
        registry.add("amp", gain_loader("amp")).unwrap();
        let names: Vec<_> = registry.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["amp", "amp (2)", "amp (3)"]);
    }

    #[test]
    fn remove_compacts_ids_downward() {
        let mut registry = PluginRegistry::new(8, true);
        registry.add("a", gain_loader("a")).unwrap();
        registry.add("b", gain_loader("b")).unwrap();
        registry.add("c", gain_loader("c")).unwrap();
        registry.remove(0).unwrap();
        let names: Vec<_> = registry.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(registry.get(0).unwrap().name(), "b");
    }

    #[test]
    fn registry_full_reports_capacity_error() {
        let mut registry = PluginRegistry::new(1, true);
        registry.add("a", gain_loader("a")).unwrap();
        let err = registry.add("b", gain_loader("b")).unwrap_err();
        assert!(matches!(err, Error::Capacity(_)));
    }

    #[test]
    fn replace_then_failing_add_leaves_earmarked_id_free() {
        let mut registry = PluginRegistry::new(8, true);
        registry.add("a", gain_loader("a")).unwrap();
        registry.add("b", gain_loader("b")).unwrap();
        registry.add("c", gain_loader("c")).unwrap();

        registry.replace(1).unwrap();
        let err = registry.add("will-fail", |_| failing_loader("bad header")).unwrap_err();
        assert!(matches!(err, Error::PluginLoadError { .. }));

        // ids are still {0,1,2}; "b" at id 1 was never touched.
        let names: Vec<_> = registry.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(registry.last_error().unwrap().contains("bad header"));

        // the earmark was cleared: the next successful add appends, not replaces.
        let id = registry.add("d", gain_loader("d")).unwrap();
        assert_eq!(id, 3);
    }

    #[test]
    fn swap_requires_both_plugins_disabled() {
        let mut registry = PluginRegistry::new(8, true);
        registry.add("a", gain_loader("a")).unwrap();
        registry.add("b", gain_loader("b")).unwrap();
        registry.get_mut(0).unwrap().set_enabled(false);
        registry.get_mut(1).unwrap().set_enabled(false);
        registry.swap(0, 1).unwrap();
        assert_eq!(registry.get(0).unwrap().name(), "b");
        assert_eq!(registry.get(1).unwrap().name(), "a");
    }

    #[test]
    fn swap_on_enabled_plugin_is_invalid_state_and_noop() {
        let mut registry = PluginRegistry::new(8, true);
        registry.add("a", gain_loader("a")).unwrap();
        registry.add("b", gain_loader("b")).unwrap();
        // plugins are enabled by default
        let err = registry.swap(0, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(registry.get(0).unwrap().name(), "a");
    }

    #[test]
    fn clone_copies_parameter_values() {
        let mut registry = PluginRegistry::new(8, true);
        let id = registry.add("amp", gain_loader("amp")).unwrap();
        registry
            .get_mut(id)
            .unwrap()
            .set_param(0, 0.25, carla_plugin::WriteFlags::CONTROL_THREAD)
            .unwrap();
        let clone_id = registry.clone_plugin(id).unwrap();
        assert_eq!(registry.get(clone_id).unwrap().param_value(0), Some(0.25));
        assert_eq!(registry.get(clone_id).unwrap().name(), "amp (2)");
    }

    #[test]
    fn rename_disambiguates_against_registry() {
        let mut registry = PluginRegistry::new(8, true);
        registry.add("a", gain_loader("a")).unwrap();
        registry.add("b", gain_loader("b")).unwrap();
        let renamed = registry.rename(1, "a").unwrap();
        assert_eq!(renamed, "a (2)");
    }

    #[test]
    fn reinit_for_sample_rate_reinits_internal_plugin_in_place() {
        let mut registry = PluginRegistry::new(8, true);
        let id = registry.add("amp", gain_loader("amp")).unwrap();
        registry
            .get_mut(id)
            .unwrap()
            .set_param(0, 0.5, carla_plugin::WriteFlags::CONTROL_THREAD)
            .unwrap();
        registry.reinit_for_sample_rate(id, 96_000.0, 256).unwrap();
        // GainPlugin supports in-place rate changes, so its id and state survive.
        assert_eq!(registry.get(id).unwrap().param_value(0), Some(0.5));
        assert_eq!(registry.get(id).unwrap().name(), "amp");
    }

    #[test]
    fn remove_compacts_ids_across_mixed_plugin_kinds() {
        let mut registry = PluginRegistry::new(8, true);
        registry.add("amp", gain_loader("amp")).unwrap();
        registry
            .add("pass", |id| Ok(Box::new(PassthroughPlugin::new(id, "pass"))))
            .unwrap();
        registry.add("amp2", gain_loader("amp2")).unwrap();

        registry.get_mut(0).unwrap().set_enabled(false);
        registry.remove(0).unwrap();

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get(0).unwrap().name(), "pass");
        assert_eq!(registry.get(0).unwrap().audio_in_count(), 2);
        assert_eq!(registry.get(1).unwrap().name(), "amp2");
    }
}
