use std::io::{BufRead, Write};
use std::time::Duration;
use tokio::sync::mpsc;

/// Surface shown to whoever is trying to remove device management
pub trait ProtectionPrompt: Send + Sync {
    fn waiting(&self, request_id: &str);

    /// Called after every unresolved poll
    fn still_waiting(&self, _remaining: Duration) {}

    fn request_failed(&self, reason: &str);

    /// The parent approved; ask for the secret code
    fn approved(&self);

    /// The submitted code was not accepted; input should be cleared
    fn code_rejected(&self, reason: &str);

    fn denied(&self);

    /// Grace period after a denial is over
    fn dismissed(&self);

    fn timed_out(&self);

    fn released(&self);
}

/// Prompt that talks to the controlling terminal
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn line(&self, message: &str) {
        // Finish any in-place progress line first
        println!("\r{:<60}", message);
    }
}

impl ProtectionPrompt for TerminalPrompt {
    fn waiting(&self, request_id: &str) {
        self.line("Uninstall request sent to the parent dashboard.");
        println!("Request id: {}", request_id);
        println!("Waiting for a parent to approve...");
    }

    fn still_waiting(&self, remaining: Duration) {
        let secs = remaining.as_secs();
        print!("\rWaiting for approval ({}:{:02} left)", secs / 60, secs % 60);
        let _ = std::io::stdout().flush();
    }

    fn request_failed(&self, reason: &str) {
        self.line("Could not send the uninstall request.");
        eprintln!("{}", reason);
        eprintln!("Check the network connection and try again.");
    }

    fn approved(&self) {
        self.line("✓ Request approved.");
        println!("Enter the parent's secret code to remove device management:");
    }

    fn code_rejected(&self, reason: &str) {
        eprintln!("✗ {}", reason);
        println!("Try again:");
    }

    fn denied(&self) {
        self.line("✗ The parent denied this request. Device management stays active.");
    }

    fn dismissed(&self) {
        println!("Closing.");
    }

    fn timed_out(&self) {
        self.line("No answer from a parent within the time limit.");
        println!("Run `curfew-agent unenroll` again to send a new request.");
    }

    fn released(&self) {
        println!("✓ Device management released. The agent can now be removed.");
    }
}

/// Forward stdin lines into a channel.
///
/// Reading happens on a blocking thread; the channel closes on EOF or when
/// the receiver is dropped.
pub fn spawn_stdin_codes() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);

    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    rx
}

#[cfg(test)]
pub use recording::RecordingPrompt;

#[cfg(test)]
mod recording {
    use super::*;
    use std::sync::Mutex;

    /// Records the name of every prompt callback in order
    #[derive(Default)]
    pub struct RecordingPrompt {
        events: Mutex<Vec<&'static str>>,
    }

    impl RecordingPrompt {
        pub fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }

        pub fn count(&self, event: &str) -> usize {
            self.events.lock().unwrap().iter().filter(|e| **e == event).count()
        }

        fn push(&self, event: &'static str) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl ProtectionPrompt for RecordingPrompt {
        fn waiting(&self, _request_id: &str) {
            self.push("waiting");
        }

        fn still_waiting(&self, _remaining: Duration) {
            self.push("still_waiting");
        }

        fn request_failed(&self, _reason: &str) {
            self.push("request_failed");
        }

        fn approved(&self) {
            self.push("approved");
        }

        fn code_rejected(&self, _reason: &str) {
            self.push("code_rejected");
        }

        fn denied(&self) {
            self.push("denied");
        }

        fn dismissed(&self) {
            self.push("dismissed");
        }

        fn timed_out(&self) {
            self.push("timed_out");
        }

        fn released(&self) {
            self.push("released");
        }
    }
}
