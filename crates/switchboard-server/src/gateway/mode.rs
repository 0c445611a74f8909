//! Channel MODE interpretation.
//!
//! A MODE line is split into single flag changes first, then the changes
//! that matter to us (`o`, `v`, `k`) are folded into one [`ModePlan`] that
//! the gateway applies to the names table in one go.

use std::collections::BTreeMap;

use switchboard_shared::constants::MODES_WITH_PARAM;
use switchboard_shared::types::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub adding: bool,
    pub mode: char,
    pub param: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedModes {
    pub changes: Vec<ModeChange>,
    /// Set when a flag group lacked its sign or a parameter was missing.
    pub broken: bool,
}

/// Split `["+o-v", "alice", "bob"]` into single flag changes.
pub fn parse_modes(args: &[String]) -> ParsedModes {
    let mut parsed = ParsedModes::default();
    let mut args = args.iter();

    while let Some(flags) = args.next() {
        let mut adding = match flags.chars().next() {
            Some('+') => true,
            Some('-') => false,
            _ => {
                parsed.broken = true;
                continue;
            }
        };

        for c in flags.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                mode => {
                    let mut param = None;
                    if MODES_WITH_PARAM.contains(mode) {
                        param = args.next().cloned();
                        if param.is_none() {
                            parsed.broken = true;
                        }
                    }
                    parsed.changes.push(ModeChange {
                        adding,
                        mode,
                        param,
                    });
                }
            }
        }
    }

    parsed
}

/// What a MODE line does to a window.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ModePlan {
    /// Final role of every member whose role changed.
    pub roles: BTreeMap<String, Role>,
    /// Password changes in order; `None` removes the password.
    pub passwords: Vec<Option<String>>,
}

/// Fold mode changes into a plan. `current` reads the role a nick has
/// before this line. Voice never downgrades an operator.
pub fn plan<F>(changes: &[ModeChange], current: F) -> ModePlan
where
    F: Fn(&str) -> Option<Role>,
{
    let mut plan = ModePlan::default();

    for change in changes {
        match (change.mode, &change.param) {
            ('o', Some(nick)) => {
                let role = if change.adding { Role::Oper } else { Role::User };
                plan.roles.insert(nick.clone(), role);
            }
            ('v', Some(nick)) => {
                let now = plan.roles.get(nick).copied().or_else(|| current(nick));
                if now != Some(Role::Oper) {
                    let role = if change.adding { Role::Voice } else { Role::User };
                    plan.roles.insert(nick.clone(), role);
                }
            }
            ('k', Some(password)) if change.adding => plan.passwords.push(Some(password.clone())),
            ('k', _) if !change.adding => plan.passwords.push(None),
            _ => {}
        }
    }

    plan
}
