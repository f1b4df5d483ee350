//! Environment flags shared between bootstrap code and controllers.
//!
//! The server (or a header script) records facts about the environment before
//! upgrading starts; controllers read them through `Options::env_flags` to
//! customize behavior, and bootstrap code waits for [`EnvFlags::ready`] to
//! learn that upgrading has finished.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

/// Flag that disables element upgrading entirely.
pub const SKIP_FLAG: &str = "no-enhance";

/// Flag set once upgrading has completed.
pub const READY_FLAG: &str = "upgrade-ready";

/// Flag indicating the page scripts loaded late (after a timeout).
pub const TIMEOUT_FLAG: &str = "timeout";

/// A shared, readable set of named boolean flags.
///
/// Clones share the same underlying flag table, so a flag set by bootstrap
/// code is visible to every controller that received the accessor.
#[derive(Clone, Debug, Default)]
pub struct EnvFlags {
    flags: Rc<RefCell<IndexMap<String, bool>>>,
}

impl EnvFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a flag. Unknown flags read as `false`.
    pub fn get(&self, name: &str) -> bool {
        self.flags.borrow().get(name).copied().unwrap_or(false)
    }

    pub fn set(&self, name: &str, value: bool) {
        self.flags.borrow_mut().insert(name.to_string(), value);
    }

    /// Signal that DOM upgrading has finished.
    pub fn ready(&self) {
        self.set(READY_FLAG, true);
    }

    pub fn is_ready(&self) -> bool {
        self.get(READY_FLAG)
    }
}

impl<'a> FromIterator<(&'a str, bool)> for EnvFlags {
    fn from_iter<I: IntoIterator<Item = (&'a str, bool)>>(iter: I) -> Self {
        let flags = EnvFlags::new();
        for (name, value) in iter {
            flags.set(name, value);
        }
        flags
    }
}
