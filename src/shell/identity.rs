//! Resolving and assuming another user's identity for a child process.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

use nix::unistd::{User, geteuid};

use crate::error::{Result, ShellError};

/// Account a child process will run as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUser {
    /// Name the caller asked for; exported as `LOGNAME`.
    pub login: String,
    /// Account name from the user database; exported as `USER`.
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

impl TargetUser {
    /// Look up `login` in the user database.
    ///
    /// Only root may switch users, so an unprivileged caller is rejected
    /// before the lookup happens.
    pub fn resolve(login: &str) -> Result<Self> {
        if !geteuid().is_root() {
            return Err(ShellError::PrivilegeRequired {
                user: login.to_string(),
            });
        }
        Self::lookup(login)
    }

    pub(crate) fn lookup(login: &str) -> Result<Self> {
        let user =
            User::from_name(login)?.ok_or_else(|| ShellError::UnknownUser(login.to_string()))?;
        Ok(Self {
            login: login.to_string(),
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
        })
    }

    /// Point the child's environment at this user and drop to its ids.
    ///
    /// The group id is applied before the user id, right before exec.
    pub fn apply(&self, command: &mut Command) {
        command
            .env("HOME", &self.home)
            .env("LOGNAME", &self.login)
            .env("USER", &self.name)
            .gid(self.gid)
            .uid(self.uid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_root() {
        let root = TargetUser::lookup("root").unwrap();
        assert_eq!(root.uid, 0);
        assert_eq!(root.name, "root");
        assert_eq!(root.login, "root");
    }

    #[test]
    fn test_lookup_unknown_user() {
        let err = TargetUser::lookup("no-such-user-rusty-shell").unwrap_err();
        assert!(matches!(err, ShellError::UnknownUser(name) if name == "no-such-user-rusty-shell"));
    }

    #[test]
    fn test_resolve_requires_root() {
        let result = TargetUser::resolve("root");
        if geteuid().is_root() {
            assert!(result.is_ok());
        } else {
            assert!(matches!(
                result,
                Err(ShellError::PrivilegeRequired { user }) if user == "root"
            ));
        }
    }

    #[test]
    fn test_apply_sets_environment() {
        let target = TargetUser {
            login: "pi".to_string(),
            name: "pi".to_string(),
            uid: 1000,
            gid: 1000,
            home: PathBuf::from("/home/pi"),
        };
        let mut command = Command::new("true");
        target.apply(&mut command);

        let envs: Vec<_> = command
            .get_envs()
            .map(|(k, v)| {
                let value = v.map(|v| v.to_string_lossy().to_string());
                (k.to_string_lossy().to_string(), value)
            })
            .collect();
        assert!(envs.contains(&("HOME".to_string(), Some("/home/pi".to_string()))));
        assert!(envs.contains(&("LOGNAME".to_string(), Some("pi".to_string()))));
        assert!(envs.contains(&("USER".to_string(), Some("pi".to_string()))));
    }
}
