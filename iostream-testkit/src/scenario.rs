//! A small scenario runner, analogous in spirit to the teacher's
//! `run_all_tests`/`run_varnish_test` pair: collect a set of named checks,
//! run each, and report every failure together rather than stopping at the
//! first one. Unlike the teacher's harness there is no external
//! `varnishtest` binary to shell out to — a "scenario" here is just a
//! closure driving an [`iostream_core::continuation::EventLoop`] to
//! completion and returning `Ok(())`/`Err(String)`.

use iostream_core::continuation::EventLoop;

pub struct Scenario {
    pub name: &'static str,
    pub run: fn(&EventLoop) -> Result<(), String>,
}

/// Run every scenario in `scenarios`, logging each one (mirroring
/// `run_varnish_test`'s "Running varnishtest {file}" line) and collecting
/// failures instead of bailing out on the first.
pub fn run_scenario(scenarios: &[Scenario]) -> Result<(), String> {
    let mut failed = Vec::new();
    for s in scenarios {
        log::info!("running scenario {}", s.name);
        let loop_ = EventLoop::new();
        if let Err(err) = (s.run)(&loop_) {
            failed.push(format!("{}: {err}", s.name));
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} scenario(s) failed:\n{}", failed.len(), failed.join("\n")))
    }
}

/// Convenience macro for declaring a table of scenarios in test modules,
/// mirroring the teacher's `run_vtc_tests!` declarative-table idiom.
#[macro_export]
macro_rules! run_scenario_tests {
    ($($name:ident => $func:expr),+ $(,)?) => {
        #[test]
        fn scenarios() {
            let scenarios = vec![$(
                $crate::Scenario { name: stringify!($name), run: $func },
            )+];
            if let Err(e) = $crate::run_scenario(&scenarios) {
                panic!("{e}");
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use iostream_core::error::CoreError;
    use iostream_core::event::Event;

    fn trivial(loop_: &EventLoop) -> Result<(), String> {
        struct Noop;
        impl iostream_core::continuation::ContinuationHandler for Noop {
            fn handle(&mut self, _event: Event) -> Result<(), CoreError> {
                Ok(())
            }
        }
        let id = loop_.register(Box::new(Noop));
        loop_.post(id, Event::Immediate);
        loop_.pump_until_idle(4);
        Ok(())
    }

    run_scenario_tests! {
        trivial_scenario => trivial,
    }
}
