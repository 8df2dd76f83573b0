//! Spawn settings for the two kinds of child process: installer processors and the game.

use std::process::Stdio;
use tokio::process::Command;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;

pub trait SpawnProfile {
    /// Captured output, no console window. The child dies with the installer.
    fn as_processor(&mut self) -> &mut Self;

    /// Captured output in its own session or process group, so the game
    /// outlives the launcher.
    fn as_game(&mut self) -> &mut Self;
}

impl SpawnProfile for Command {
    fn as_processor(&mut self) -> &mut Self {
        #[cfg(windows)]
        self.creation_flags(CREATE_NO_WINDOW);
        captured(self)
    }

    fn as_game(&mut self) -> &mut Self {
        #[cfg(windows)]
        self.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
        #[cfg(unix)]
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            self.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
        captured(self)
    }
}

fn captured(command: &mut Command) -> &mut Command {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
}
