use std::collections::{HashMap, HashSet};

use crate::{Result, StyleErr, Tensor};

/// Identifies one registration of a [`HookDict`]. Handles of older registrations are stale and
/// detaching with them does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(u64);

#[derive(Debug)]
struct Registration {
    handle: HookHandle,
    keys: HashSet<String>,
    // None until the first pass after arming
    stored: Option<HashMap<String, Tensor>>,
}

/// A set of armed observation points and the values they captured on the last pass.
#[derive(Debug, Default)]
pub struct HookDict {
    registration: Option<Registration>,
    generation: u64,
}

impl HookDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the given keys, first detaching whatever was armed before.
    ///
    /// # Returns
    /// The handle of the new registration.
    pub fn attach<I, S>(&mut self, keys: I) -> HookHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clear();

        self.generation += 1;
        let handle = HookHandle(self.generation);
        self.registration = Some(Registration {
            handle,
            keys: keys.into_iter().map(Into::into).collect(),
            stored: None,
        });

        handle
    }

    /// Removes the registration identified by `handle` together with its captures.
    ///
    /// # Returns
    /// Whether anything was detached. Detaching twice, or with a stale handle, is a no-op.
    pub fn detach(&mut self, handle: HookHandle) -> bool {
        match &self.registration {
            Some(r) if r.handle == handle => {
                self.registration = None;
                true
            }
            _ => false,
        }
    }

    /// Removes the current registration, if any.
    pub fn clear(&mut self) {
        self.registration = None;
    }

    pub fn handle(&self) -> Option<HookHandle> {
        self.registration.as_ref().map(|r| r.handle)
    }

    pub fn is_attached(&self) -> bool {
        self.registration.is_some()
    }

    /// Whether `key` is observed by the current registration.
    pub fn is_armed(&self, key: &str) -> bool {
        self.registration
            .as_ref()
            .is_some_and(|r| r.keys.contains(key))
    }

    pub fn armed_keys(&self) -> impl Iterator<Item = &str> {
        self.registration
            .iter()
            .flat_map(|r| r.keys.iter().map(String::as_str))
    }

    /// Replaces the stored captures with the ones of a finished pass. Captures for keys that
    /// are not armed are dropped.
    pub(crate) fn commit(&mut self, mut captured: HashMap<String, Tensor>) {
        if let Some(r) = &mut self.registration {
            captured.retain(|key, _| r.keys.contains(key));
            r.stored = Some(captured);
        }
    }

    /// Every value captured on the last pass.
    ///
    /// # Returns
    /// The captures by key, or a `HookState` error if nothing is attached or no pass ran since
    /// attaching.
    pub fn stored(&self) -> Result<&HashMap<String, Tensor>> {
        let Some(r) = &self.registration else {
            return Err(StyleErr::hook_state("no hooks are attached"));
        };

        r.stored
            .as_ref()
            .ok_or_else(|| StyleErr::hook_state("no pass has run since the hooks were attached"))
    }

    /// The value captured for `key` on the last pass.
    pub fn get_stored(&self, key: &str) -> Result<&Tensor> {
        let stored = self.stored()?;
        if !self.is_armed(key) {
            return Err(StyleErr::hook_state(format!("'{key}' is not hooked")));
        }

        stored
            .get(key)
            .ok_or_else(|| StyleErr::hook_state(format!("nothing was captured for '{key}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn captures(keys: &[&str]) -> HashMap<String, Tensor> {
        keys.iter()
            .map(|k| (k.to_string(), Tensor::zeros(IxDyn(&[1]))))
            .collect()
    }

    #[test]
    fn reading_before_any_pass_is_an_error() {
        let mut hooks = HookDict::new();
        hooks.attach(["a"]);

        assert!(matches!(
            hooks.get_stored("a"),
            Err(StyleErr::HookState { .. })
        ));
    }

    #[test]
    fn reattaching_drops_previous_captures() {
        let mut hooks = HookDict::new();

        hooks.attach(["a"]);
        hooks.commit(captures(&["a"]));
        assert!(hooks.get_stored("a").is_ok());

        hooks.attach(["b"]);
        hooks.commit(captures(&["a", "b"]));

        let stored = hooks.stored().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored.contains_key("b"));
        assert!(hooks.get_stored("a").is_err());
    }

    #[test]
    fn detach_is_idempotent_and_ignores_stale_handles() {
        let mut hooks = HookDict::new();

        let old = hooks.attach(["a"]);
        let new = hooks.attach(["b"]);

        assert!(!hooks.detach(old));
        assert!(hooks.is_armed("b"));

        assert!(hooks.detach(new));
        assert!(!hooks.detach(new));
        assert!(!hooks.is_attached());
        assert!(hooks.stored().is_err());
    }

    #[test]
    fn detach_with_nothing_attached_is_a_no_op() {
        let mut hooks = HookDict::new();
        let handle = hooks.attach(Vec::<String>::new());
        hooks.clear();

        assert!(!hooks.detach(handle));
    }
}
