//! Terminal event sink: step and tool progress on stderr.

use chainlite_agent::ChainEventSink;
use chainlite_core::text::safe_truncate;

pub struct TerminalSink {
    verbose: bool,
}

impl TerminalSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ChainEventSink for TerminalSink {
    fn on_step_start(&mut self, index: usize, agent: &str) {
        eprintln!("▶ step {}: {}", index + 1, agent);
    }

    fn on_step_finish(&mut self, index: usize, agent: &str, output: &str, failed: bool) {
        let icon = if failed { "❌" } else { "✅" };
        if self.verbose || failed {
            eprintln!("{} step {}: {}  {}", icon, index + 1, agent, safe_truncate(output, 200));
        } else {
            eprintln!("{} step {}: {}", icon, index + 1, agent);
        }
    }

    fn on_step_skipped(&mut self, index: usize, agent_id: &str) {
        eprintln!("⏭ step {}: unknown agent {}", index + 1, agent_id);
    }

    fn on_tool_call(&mut self, name: &str, arguments: &str) {
        if self.verbose {
            let args_display = if arguments.len() > 200 {
                format!("{}…", safe_truncate(arguments, 200))
            } else {
                arguments.to_string()
            };
            eprintln!("🔧 Tool: {}  args={}", name, args_display);
        } else {
            eprintln!("🔧 {}", name);
        }
    }

    fn on_tool_result(&mut self, name: &str, result: &str, is_error: bool) {
        let icon = if is_error { "❌" } else { "✅" };
        if self.verbose {
            eprintln!("{} {}: {}", icon, name, safe_truncate(result, 300));
        } else {
            eprintln!("{} {}", icon, name);
        }
    }
}
