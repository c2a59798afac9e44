//! `RestoreEnv`: the process-wide facts (current identity, root-ness) that
//! would otherwise be read ad hoc from global state. Threaded explicitly to
//! the projector (D), the reconciler (C) and the scheduler (F), per §9.

use anyhow::Error;

use crate::ident;

#[derive(Clone, Debug)]
pub struct RestoreEnv {
    pub is_root: bool,
    pub current_user: String,
    pub current_group: String,
}

impl RestoreEnv {
    /// Snapshot the current process's identity once at controller start.
    pub fn discover() -> Result<Self, Error> {
        let (current_user, current_group) = ident::current_user_group()?;
        Ok(Self {
            is_root: ident::is_root(),
            current_user,
            current_group,
        })
    }

    #[cfg(test)]
    pub fn fake(is_root: bool, user: &str, group: &str) -> Self {
        Self {
            is_root,
            current_user: user.to_string(),
            current_group: group.to_string(),
        }
    }
}
