/// Core types for game launching
use crate::game::installer::types::Platform;
use crate::utils::process::SpawnProfile;
use std::path::{Path, PathBuf};

/// Who is playing and how the JVM should be sized.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Player username
    pub username: String,

    /// Player UUID; derived from the username when unset
    pub uuid: Option<String>,

    /// Access token for authentication
    pub access_token: String,

    /// User type ("msa" or "legacy")
    pub user_type: String,

    /// Xbox User ID (optional)
    pub xuid: Option<String>,

    /// Client ID passed through to `${clientid}`
    pub client_id: String,

    /// Minimum memory in MB (optional)
    pub min_memory: Option<u32>,

    /// Maximum memory in MB (optional)
    pub max_memory: Option<u32>,

    /// Extra JVM arguments, shell-quoted; replaces the default tuning flags
    pub extra_jvm_args: Option<String>,

    /// Extra game arguments, shell-quoted; appended
    pub extra_game_args: Option<String>,

    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
}

impl LaunchRequest {
    /// An offline player with a legacy session.
    pub fn offline(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            uuid: None,
            access_token: "0".to_string(),
            user_type: "legacy".to_string(),
            xuid: None,
            client_id: String::new(),
            min_memory: None,
            max_memory: None,
            extra_jvm_args: None,
            extra_game_args: None,
            window_width: None,
            window_height: None,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_session(mut self, access_token: impl Into<String>, user_type: impl Into<String>) -> Self {
        self.access_token = access_token.into();
        self.user_type = user_type.into();
        self
    }

    pub fn with_memory(mut self, min_mb: Option<u32>, max_mb: Option<u32>) -> Self {
        self.min_memory = min_mb;
        self.max_memory = max_mb;
        self
    }

    pub fn with_extra_jvm_args(mut self, args: impl Into<String>) -> Self {
        self.extra_jvm_args = Some(args.into());
        self
    }

    pub fn with_extra_game_args(mut self, args: impl Into<String>) -> Self {
        self.extra_game_args = Some(args.into());
        self
    }

    pub fn with_window(mut self, width: u32, height: u32) -> Self {
        self.window_width = Some(width);
        self.window_height = Some(height);
        self
    }
}

/// Directories and host facts the assembler substitutes into templates.
#[derive(Debug, Clone)]
pub struct LaunchEnvironment {
    pub platform: Platform,
    pub libraries_dir: PathBuf,
    pub versions_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub natives_dir: PathBuf,
    /// Per-version game directory, also the working directory
    pub game_dir: PathBuf,
    /// Binary produced for a loader profile, appended last to the classpath
    pub loader_binary: Option<PathBuf>,
}

/// Everything needed to start the game process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchInvocation {
    pub jvm_args: Vec<String>,
    pub main_class: String,
    pub program_args: Vec<String>,
    pub classpath: Vec<PathBuf>,
    pub classpath_string: String,
    pub working_dir: PathBuf,
}

impl LaunchInvocation {
    /// JVM arguments, main class, then program arguments.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.jvm_args.clone();
        args.push(self.main_class.clone());
        args.extend(self.program_args.iter().cloned());
        args
    }

    /// A detached command ready to spawn; stdio is piped for the caller to stream.
    pub fn command(&self, java: &Path) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(java);
        command
            .args(self.args())
            .current_dir(&self.working_dir)
            .as_game();
        command
    }
}
