// Shared test helpers: an in-memory iptables stand-in behind the CommandRunner seam

#![allow(dead_code)]

use netflow::accounting_repo::AccountingRepo;
use netflow::engine::FlowEngine;
use netflow::models::Direction;
use netflow::pipeline::{CommandRunner, CommandSpec, PipelineError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeTables {
    calls: Vec<Vec<CommandSpec>>,
    /// (chain, match flag, port) -> number of identical rules installed.
    rules: HashMap<(String, String, u16), usize>,
    counters: HashMap<(u16, Direction), i64>,
    raw_output: HashMap<(u16, Direction), String>,
    /// Counter queries that hang and hit the stage timeout.
    timeouts: HashSet<(u16, Direction)>,
}

/// Answers rule append/delete and the four-stage counter query the way iptables would:
/// a counter row only exists while its accounting rule is installed.
#[derive(Clone, Default)]
pub struct FakeRunner {
    tables: Arc<Mutex<FakeTables>>,
}

impl FakeRunner {
    pub fn set_counter(&self, port: u16, direction: Direction, bytes: i64) {
        let mut t = self.tables.lock().unwrap();
        t.counters.insert((port, direction), bytes);
    }

    pub fn set_raw_output(&self, port: u16, direction: Direction, text: &str) {
        let mut t = self.tables.lock().unwrap();
        t.raw_output.insert((port, direction), text.to_string());
    }

    pub fn set_timeout(&self, port: u16, direction: Direction) {
        let mut t = self.tables.lock().unwrap();
        t.timeouts.insert((port, direction));
    }

    pub fn preinstall_rule(&self, chain: &str, flag: &str, port: u16) {
        let mut t = self.tables.lock().unwrap();
        *t.rules
            .entry((chain.to_string(), flag.to_string(), port))
            .or_default() += 1;
    }

    pub fn rule_count(&self, chain: &str, flag: &str, port: u16) -> usize {
        let t = self.tables.lock().unwrap();
        t.rules
            .get(&(chain.to_string(), flag.to_string(), port))
            .copied()
            .unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<Vec<CommandSpec>> {
        self.tables.lock().unwrap().calls.clone()
    }

    /// Number of single-command invocations whose first argument is `action` ("-A"/"-D").
    pub fn rule_calls(&self, action: &str) -> usize {
        self.calls()
            .iter()
            .filter(|stages| {
                stages.len() == 1 && stages[0].args.first().map(String::as_str) == Some(action)
            })
            .count()
    }

    pub fn counter_queries(&self) -> usize {
        self.calls().iter().filter(|stages| stages.len() == 4).count()
    }

    pub fn clear_calls(&self) {
        self.tables.lock().unwrap().calls.clear();
    }

    fn answer(t: &mut FakeTables, stages: &[CommandSpec]) -> Result<String, PipelineError> {
        match stages {
            [rule] if rule.args.len() == 6 => {
                let key = (
                    rule.args[1].clone(),
                    rule.args[4].clone(),
                    rule.args[5].parse::<u16>().unwrap(),
                );
                match rule.args[0].as_str() {
                    "-A" => {
                        *t.rules.entry(key).or_default() += 1;
                        Err(PipelineError::NoOutput)
                    }
                    "-D" => match t.rules.get_mut(&key) {
                        Some(n) if *n > 0 => {
                            *n -= 1;
                            Err(PipelineError::NoOutput)
                        }
                        _ => Err(rule_missing(rule)),
                    },
                    _ => Err(rule_missing(rule)),
                }
            }
            [_, grep, _, _] => {
                let selector = grep.args.last().cloned().unwrap_or_default();
                let (direction, port) = if let Some(p) = selector.strip_prefix("tcp dpt:") {
                    (Direction::Inbound, p.parse::<u16>().unwrap())
                } else if let Some(p) = selector.strip_prefix("tcp spt:") {
                    (Direction::Outbound, p.parse::<u16>().unwrap())
                } else {
                    return Err(PipelineError::NoOutput);
                };
                let key = (
                    direction.chain().to_string(),
                    direction.port_flag().to_string(),
                    port,
                );
                if t.timeouts.contains(&(port, direction)) {
                    return Err(PipelineError::Timeout {
                        stage: 0,
                        command: stages[0].to_string(),
                        timeout: Duration::from_secs(5),
                    });
                }
                if t.rules.get(&key).copied().unwrap_or(0) == 0 {
                    return Err(PipelineError::NoOutput);
                }
                if let Some(raw) = t.raw_output.get(&(port, direction)) {
                    return Ok(raw.clone());
                }
                let bytes = t.counters.get(&(port, direction)).copied().unwrap_or(0);
                Ok(format!("{bytes}\n"))
            }
            _ => Err(PipelineError::Empty),
        }
    }
}

fn rule_missing(rule: &CommandSpec) -> PipelineError {
    PipelineError::Io {
        stage: 0,
        command: rule.to_string(),
        source: std::io::Error::other("Bad rule (does a matching rule exist in that chain?)"),
    }
}

impl CommandRunner for FakeRunner {
    async fn run(&self, stages: &[CommandSpec]) -> Result<String, PipelineError> {
        let mut t = self.tables.lock().unwrap();
        t.calls.push(stages.to_vec());
        Self::answer(&mut t, stages)
    }
}

pub fn engine_with(ports: &[u16], interval_secs: u64) -> (Arc<FlowEngine<FakeRunner>>, FakeRunner) {
    let runner = FakeRunner::default();
    let repo = AccountingRepo::new(runner.clone(), "iptables");
    (
        Arc::new(FlowEngine::new(repo, ports, interval_secs)),
        runner,
    )
}
