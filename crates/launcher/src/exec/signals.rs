//! Signal relay between the launcher and the delegated runtime
//!
//! Termination-style signals sent to the launcher's pid are relayed to the child.
//! Keyboard signals (SIGINT, SIGQUIT) are delivered by the terminal to the whole
//! foreground process group, so the child already has them; the launcher only has to
//! survive them and report whatever the child does.

#[cfg(unix)]
pub use unix::{raise_default, SignalForwarder};

#[cfg(windows)]
pub use windows::SignalForwarder;

#[cfg(unix)]
mod unix {
    use nix::sys::signal::{self, SigHandler, SigSet, Signal};
    use nix::unistd::Pid;
    use parking_lot::Mutex;
    use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1, SIGUSR2};
    use signal_hook::iterator::{Handle, Signals};
    use std::io;
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};

    const FORWARDED: [i32; 4] = [SIGTERM, SIGHUP, SIGUSR1, SIGUSR2];
    const SWALLOWED: [i32; 2] = [SIGINT, SIGQUIT];

    #[derive(Default)]
    struct RelayState {
        child: Option<Pid>,
        // Signals that arrived between install and spawn
        pending: Vec<i32>,
    }

    /// Relays signals to the child for as long as it is alive.
    ///
    /// Install before spawning so nothing that arrives in between is lost, attach the
    /// child once it exists, and detach as soon as it has been reaped.
    pub struct SignalForwarder {
        handle: Handle,
        state: Arc<Mutex<RelayState>>,
        thread: Option<JoinHandle<()>>,
    }

    impl SignalForwarder {
        pub fn install() -> io::Result<Self> {
            let mut signals = Signals::new(FORWARDED.iter().chain(SWALLOWED.iter()))?;
            let handle = signals.handle();
            let state = Arc::new(Mutex::new(RelayState::default()));

            let relay = Arc::clone(&state);
            let thread = thread::Builder::new()
                .name("cmdshim-signals".to_string())
                .spawn(move || {
                    for sig in signals.forever() {
                        if SWALLOWED.contains(&sig) {
                            log::trace!("ignoring signal {sig}; child receives it from the terminal");
                            continue;
                        }
                        let mut state = relay.lock();
                        match state.child {
                            Some(pid) => relay_to(pid, sig),
                            None => state.pending.push(sig),
                        }
                    }
                })?;

            Ok(Self {
                handle,
                state,
                thread: Some(thread),
            })
        }

        pub fn attach(&self, pid: u32) {
            let pid = Pid::from_raw(pid as i32);
            let mut state = self.state.lock();
            state.child = Some(pid);
            for sig in state.pending.drain(..) {
                relay_to(pid, sig);
            }
        }

        /// Stop relaying. Must be called once the child is reaped so a recycled pid
        /// never receives a stray signal.
        pub fn detach(&self) {
            self.state.lock().child = None;
        }
    }

    impl Drop for SignalForwarder {
        fn drop(&mut self) {
            self.detach();
            self.handle.close();
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    fn relay_to(pid: Pid, sig: i32) {
        let Ok(signal) = Signal::try_from(sig) else {
            return;
        };
        log::debug!("relaying {signal} to child {pid}");
        if let Err(err) = signal::kill(pid, signal) {
            log::debug!("relay of {signal} to {pid} failed: {err}");
        }
    }

    /// Terminate the launcher with `sig` under its default disposition, so the caller
    /// observes the same signal the child died from. Falls back to `128 + sig` for
    /// signals whose default action does not terminate.
    pub fn raise_default(sig: i32) -> ! {
        if let Ok(signal) = Signal::try_from(sig) {
            // Safety: resetting to SIG_DFL installs no Rust code as a handler
            unsafe {
                let _ = signal::signal(signal, SigHandler::SigDfl);
            }
            let mut mask = SigSet::empty();
            mask.add(signal);
            let _ = mask.thread_unblock();
            let _ = signal::raise(signal);
        }
        std::process::exit(128 + sig)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_pending_signals_flush_on_attach() {
            use std::os::unix::process::ExitStatusExt;
            use std::process::Command;

            let forwarder = SignalForwarder::install().unwrap();
            forwarder.state.lock().pending.push(SIGTERM);

            let mut child = Command::new("sleep").arg("30").spawn().unwrap();
            forwarder.attach(child.id());
            let status = child.wait().unwrap();
            forwarder.detach();

            assert_eq!(status.signal(), Some(SIGTERM));
            assert!(forwarder.state.lock().pending.is_empty());
        }

        #[test]
        fn test_install_and_drop_does_not_hang() {
            let forwarder = SignalForwarder::install().unwrap();
            forwarder.detach();
            drop(forwarder);
        }

        #[test]
        fn test_relay_to_dead_pid_is_quiet() {
            // pid near the top of the range is very unlikely to exist
            relay_to(Pid::from_raw(i32::MAX - 1), SIGUSR1);
        }
    }
}

#[cfg(windows)]
mod windows {
    use std::io;
    use std::sync::Once;

    /// Console control events reach every process attached to the console, so the
    /// child sees Ctrl+C on its own. The launcher only needs to outlive it.
    pub struct SignalForwarder;

    impl SignalForwarder {
        pub fn install() -> io::Result<Self> {
            static INIT: Once = Once::new();
            INIT.call_once(|| {
                if let Err(err) = ctrlc::set_handler(|| {}) {
                    log::debug!("could not install console control handler: {err}");
                }
            });
            Ok(Self)
        }

        pub fn attach(&self, _pid: u32) {}

        pub fn detach(&self) {}
    }
}
