use super::listener::Listener;
use super::state::{FeatureState, RunState, RunSummary, ScenarioState, Status, StepState};
use anyhow::Result;
use tokio::sync::broadcast;

/// Run events for real-time console updates
#[derive(Debug, Clone)]
pub enum TestEvent {
    RunStarted {
        session_id: String,
    },
    RunFinished {
        summary: RunSummary,
    },

    FeatureStarted {
        name: String,
        path: String,
        scenario_count: usize,
    },
    FeatureFinished {
        name: String,
        status: Status,
        duration_ms: Option<u64>,
    },

    ScenarioStarted {
        name: String,
        step_count: usize,
    },
    ScenarioFinished {
        name: String,
        status: Status,
        error: Option<String>,
        duration_ms: Option<u64>,
    },

    StepStarted {
        keyword: String,
        text: String,
    },
    StepPassed {
        duration_ms: u64,
    },
    StepFailed {
        error: String,
        duration_ms: u64,
    },
    StepUndefined,
    StepSkipped {
        keyword: String,
        text: String,
    },

    Log {
        message: String,
    },
}

/// Event emitter for broadcasting run events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<TestEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<TestEvent>) {
        let (sender, receiver) = broadcast::channel(100);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: TestEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }
}

/// Turns listener callbacks into [`TestEvent`]s
pub struct EventListener {
    emitter: EventEmitter,
    show_skipped: bool,
}

impl EventListener {
    pub fn new(emitter: EventEmitter, show_skipped: bool) -> Self {
        Self {
            emitter,
            show_skipped,
        }
    }

    fn hidden(&self, scenario: &ScenarioState) -> bool {
        !self.show_skipped && scenario.status == Status::Skipped
    }
}

impl Listener for EventListener {
    fn before_all(&mut self, run: &RunState) -> Result<()> {
        self.emitter.emit(TestEvent::RunStarted {
            session_id: run.session_id.clone(),
        });
        Ok(())
    }

    fn before_feature(&mut self, feature: &FeatureState) -> Result<()> {
        self.emitter.emit(TestEvent::FeatureStarted {
            name: feature.name.clone(),
            path: feature.path.clone(),
            scenario_count: feature.scenarios.len(),
        });
        Ok(())
    }

    fn before_scenario(&mut self, scenario: &ScenarioState) -> Result<()> {
        if !self.hidden(scenario) {
            self.emitter.emit(TestEvent::ScenarioStarted {
                name: scenario.name.clone(),
                step_count: scenario.steps.len(),
            });
        }
        Ok(())
    }

    fn before_step(&mut self, step: &StepState) -> Result<()> {
        self.emitter.emit(TestEvent::StepStarted {
            keyword: step.keyword.clone(),
            text: step.name.clone(),
        });
        Ok(())
    }

    fn after_step(&mut self, step: &StepState) -> Result<()> {
        let duration_ms = step.duration_ms.unwrap_or(0);
        let event = match step.status {
            Status::Failed => TestEvent::StepFailed {
                error: step.error.clone().unwrap_or_default(),
                duration_ms,
            },
            Status::Undefined => TestEvent::StepUndefined,
            _ => TestEvent::StepPassed { duration_ms },
        };
        self.emitter.emit(event);
        Ok(())
    }

    fn after_scenario(&mut self, scenario: &ScenarioState) -> Result<()> {
        if self.hidden(scenario) {
            return Ok(());
        }
        for step in scenario.steps.iter().filter(|s| s.status == Status::Skipped) {
            self.emitter.emit(TestEvent::StepSkipped {
                keyword: step.keyword.clone(),
                text: step.name.clone(),
            });
        }
        self.emitter.emit(TestEvent::ScenarioFinished {
            name: scenario.name.clone(),
            status: scenario.status,
            error: scenario.error.clone(),
            duration_ms: scenario.duration_ms,
        });
        Ok(())
    }

    fn after_feature(&mut self, feature: &FeatureState) -> Result<()> {
        self.emitter.emit(TestEvent::FeatureFinished {
            name: feature.name.clone(),
            status: feature.status,
            duration_ms: feature.duration_ms,
        });
        Ok(())
    }

    fn after_all(&mut self, run: &RunState) -> Result<()> {
        self.emitter.emit(TestEvent::RunFinished {
            summary: run.summary(),
        });
        Ok(())
    }
}

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration as StdDuration;

fn status_label(status: Status) -> colored::ColoredString {
    use colored::Colorize;
    match status {
        Status::Passed => "PASSED".green().bold(),
        Status::Failed => "FAILED".red().bold(),
        Status::Skipped => "SKIPPED".yellow().bold(),
        Status::Undefined => "UNDEFINED".yellow().bold(),
        Status::Untested => "UNTESTED".white().bold(),
    }
}

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<TestEvent>) {
        use broadcast::error::RecvError;
        use colored::Colorize;
        use indicatif::ProgressDrawTarget;
        use std::io::IsTerminal;

        // Piped output gets no spinner escape codes
        let multi = if std::io::stdout().is_terminal() {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let mut spinner: Option<ProgressBar> = None;
        let mut step_text = String::new();

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    log::warn!("console output dropped {} events", missed);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match event {
                TestEvent::RunStarted { session_id } => {
                    multi
                        .println(format!(
                            "\n{} Test run started: {}",
                            "▶".green().bold(),
                            session_id.cyan()
                        ))
                        .ok();
                }

                TestEvent::RunFinished { summary } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish();
                    }
                    println!("\n{} Test run finished", "■".blue().bold());
                    for (label, counts) in [
                        ("features", summary.features),
                        ("scenarios", summary.scenarios),
                        ("steps", summary.steps),
                    ] {
                        println!(
                            "  {} {}: {} passed, {} failed, {} skipped, {} undefined, {} untested",
                            counts.total,
                            label,
                            counts.passed.to_string().green(),
                            counts.failed.to_string().red(),
                            counts.skipped.to_string().yellow(),
                            counts.undefined.to_string().yellow(),
                            counts.untested
                        );
                    }
                    if let Some(duration) = summary.total_duration_ms {
                        println!("  Duration: {}ms", duration);
                    }
                }

                TestEvent::FeatureStarted {
                    name,
                    scenario_count,
                    ..
                } => {
                    println!(
                        "\n  {} Feature: {} ({} scenarios)",
                        "→".blue(),
                        name.white().bold(),
                        scenario_count
                    );
                }

                TestEvent::FeatureFinished {
                    name,
                    status,
                    duration_ms,
                } => {
                    println!("  {} Feature {} [{}]", "←".blue(), name, status_label(status));
                    if let Some(duration) = duration_ms {
                        println!("    Duration: {}ms", duration);
                    }
                }

                TestEvent::ScenarioStarted { name, step_count } => {
                    println!(
                        "\n      {} Scenario: {} ({} steps)",
                        "→".blue(),
                        name.white(),
                        step_count
                    );
                }

                TestEvent::ScenarioFinished {
                    name,
                    status,
                    error,
                    duration_ms,
                } => {
                    if let Some(error) = error {
                        println!("          {}", error.red());
                    }
                    let duration = duration_ms.map(|d| format!(" ({}ms)", d)).unwrap_or_default();
                    println!(
                        "      {} Scenario {} [{}]{}",
                        "←".blue(),
                        name,
                        status_label(status),
                        duration
                    );
                }

                TestEvent::StepStarted { keyword, text } => {
                    let pb = multi.add(ProgressBar::new_spinner());
                    if let Ok(style) = ProgressStyle::default_spinner()
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .template("          {spinner} {msg}")
                    {
                        pb.set_style(style);
                    }
                    step_text = format!("{} {} ", keyword.bold(), text.dimmed());
                    pb.set_message(step_text.clone());
                    pb.enable_steady_tick(StdDuration::from_millis(100));
                    spinner = Some(pb);
                }

                TestEvent::StepPassed { duration_ms } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("          {} {}({}ms)", "✓".green(), step_text, duration_ms);
                }

                TestEvent::StepFailed { error, duration_ms } => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("          {} {}({}ms)", "✗".red(), step_text, duration_ms);
                    for line in error.lines() {
                        println!("              {}", line.red());
                    }
                }

                TestEvent::StepUndefined => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                    }
                    println!("          {} {}({})", "?".yellow(), step_text, "undefined".yellow());
                }

                TestEvent::StepSkipped { keyword, text } => {
                    println!(
                        "          {} {} {}",
                        "○".yellow(),
                        keyword.dimmed(),
                        text.dimmed()
                    );
                }

                TestEvent::Log { message } => {
                    multi.println(format!("          {}", message)).ok();
                }
            }
        }
    }
}
