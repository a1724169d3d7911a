use crate::gateway::{timed_complete, ChatCompletionGateway, ChatMessage};
use chrono::{NaiveDate, Utc};
use okr_copilot_common::{KeyResult, Member, WorkItem, WorkItemPriority};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const SECTION_SEPARATOR: &str = "\n\n----------------------------------------\n\n";

/// Risk classification for one key result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    High,
    AtRisk,
    OnTrack,
    /// Zero tasks or a zero-length schedule; omitted from the risk list
    /// rather than producing NaN.
    NotComputable,
}

/// Flags a key result against its schedule:
/// `elapsed = (today - start) / (end - start)`, `progress = completed / total`;
/// High if `elapsed > progress + 0.35`, AtRisk if `elapsed > progress + 0.20`.
pub fn classify_risk(
    start_date: NaiveDate,
    end_date: NaiveDate,
    today: NaiveDate,
    completed_tasks: usize,
    total_tasks: usize,
) -> RiskLevel {
    let span_days = (end_date - start_date).num_days();
    if total_tasks == 0 || span_days <= 0 {
        return RiskLevel::NotComputable;
    }

    let elapsed = (today - start_date).num_days() as f64 / span_days as f64;
    let progress = completed_tasks as f64 / total_tasks as f64;

    if elapsed > progress + 0.35 {
        RiskLevel::High
    } else if elapsed > progress + 0.20 {
        RiskLevel::AtRisk
    } else {
        RiskLevel::OnTrack
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadLevel {
    Overloaded,
    Balanced,
    Underutilized,
}

/// A person is overloaded above 4 active tasks (strictly greater) or above 2
/// high-priority active tasks; underutilized at zero active tasks.
pub fn classify_workload(active_tasks: usize, high_priority_active: usize) -> WorkloadLevel {
    if active_tasks > 4 || high_priority_active > 2 {
        WorkloadLevel::Overloaded
    } else if active_tasks == 0 {
        WorkloadLevel::Underutilized
    } else {
        WorkloadLevel::Balanced
    }
}

/// Progress snapshot for one key result, built from its tasks.
#[derive(Debug, Clone)]
pub struct KeyResultProgress {
    pub key_result: KeyResult,
    pub total_tasks: usize,
    pub completed_tasks: usize,
}

impl KeyResultProgress {
    pub fn from_tasks(key_result: KeyResult, tasks: &[WorkItem]) -> Self {
        let completed_tasks = tasks.iter().filter(|task| !task.is_active()).count();
        Self {
            key_result,
            total_tasks: tasks.len(),
            completed_tasks,
        }
    }

    pub fn risk(&self, today: NaiveDate) -> RiskLevel {
        classify_risk(
            self.key_result.start_date,
            self.key_result.end_date,
            today,
            self.completed_tasks,
            self.total_tasks,
        )
    }
}

/// Load snapshot for one person, built from their assigned tasks.
#[derive(Debug, Clone)]
pub struct MemberLoad {
    pub member: Member,
    pub active_tasks: usize,
    pub high_priority_active: usize,
}

impl MemberLoad {
    pub fn from_tasks(member: Member, tasks: &[WorkItem]) -> Self {
        let active: Vec<&WorkItem> = tasks.iter().filter(|task| task.is_active()).collect();
        let high_priority_active = active
            .iter()
            .filter(|task| task.priority == WorkItemPriority::High)
            .count();
        Self {
            member,
            active_tasks: active.len(),
            high_priority_active,
        }
    }

    pub fn workload(&self) -> WorkloadLevel {
        classify_workload(self.active_tasks, self.high_priority_active)
    }
}

/// Input snapshot for one analysis run, gathered from the CRUD boundary by
/// the caller before the pipeline starts.
#[derive(Debug, Clone, Default)]
pub struct AnalysisData {
    pub key_results: Vec<KeyResultProgress>,
    pub members: Vec<MemberLoad>,
}

/// The four fixed phases, in canonical order. Linear, no branching, no
/// retries between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Overview,
    Risk,
    Overload,
    Redistribution,
}

impl AnalysisPhase {
    pub const ALL: [AnalysisPhase; 4] = [
        AnalysisPhase::Overview,
        AnalysisPhase::Risk,
        AnalysisPhase::Overload,
        AnalysisPhase::Redistribution,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            AnalysisPhase::Overview => "Overview",
            AnalysisPhase::Risk => "Risk Analysis",
            AnalysisPhase::Overload => "Overload Analysis",
            AnalysisPhase::Redistribution => "Task Redistribution",
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            AnalysisPhase::Overview => {
                "You are producing the Overview section of an OKR risk report. \
                 You may call the session, objective and key-result listing \
                 functions to gather structure. Required sections: 'Scope' and \
                 'Current Structure'. Describe what exists; do not assess risk \
                 yet."
            }
            AnalysisPhase::Risk => {
                "You are producing the Risk Analysis section. You may call the \
                 key-result and task listing functions. Required sections: \
                 'At-Risk Key Results' and 'Drivers'. Use only the risk flags \
                 provided in the data digest. Do not repeat the Overview \
                 section's content."
            }
            AnalysisPhase::Overload => {
                "You are producing the Overload Analysis section. You may call \
                 the task-by-assignee listing functions. Required sections: \
                 'Overloaded People' and 'Underutilized People'. Use only the \
                 workload flags provided in the data digest. Do not repeat \
                 earlier sections' content."
            }
            AnalysisPhase::Redistribution => {
                "You are producing the Task Redistribution section. You may \
                 call the task listing functions. Required sections: 'Proposed \
                 Moves' and 'Expected Effect'. Propose concrete task moves from \
                 overloaded to underutilized people. Do not repeat earlier \
                 sections' content."
            }
        }
    }

    /// Short fixed-text description of what prior phases completed; carried
    /// forward instead of their full output to bound prompt growth.
    fn prior_digest(&self) -> &'static str {
        match self {
            AnalysisPhase::Overview => "",
            AnalysisPhase::Risk => {
                "Completed so far: an overview of the session's objectives and \
                 key results."
            }
            AnalysisPhase::Overload => {
                "Completed so far: an overview of the session and a risk \
                 assessment of its key results."
            }
            AnalysisPhase::Redistribution => {
                "Completed so far: an overview, a key-result risk assessment \
                 and a per-person workload assessment."
            }
        }
    }
}

/// Runs the fixed Overview → Risk → Overload → Redistribution pipeline. A
/// phase failure becomes an inline error marker; later phases still run. The
/// report always carries all four labeled sections in canonical order.
pub struct AnalysisOrchestrator {
    gateway: Arc<dyn ChatCompletionGateway>,
    timeout: Duration,
}

impl AnalysisOrchestrator {
    pub fn new(gateway: Arc<dyn ChatCompletionGateway>) -> Self {
        Self {
            gateway,
            timeout: Duration::from_secs(90),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self, user_request: &str, data: &AnalysisData) -> String {
        let started_at = Utc::now();
        info!("Starting risk analysis run");

        let today = started_at.date_naive();
        let mut sections = Vec::with_capacity(AnalysisPhase::ALL.len());
        for phase in AnalysisPhase::ALL {
            let output = self.run_phase(phase, user_request, data, today).await;
            sections.push(format!("## {}\n\n{}", phase.title(), output));
        }

        let finished_at = Utc::now();
        format!(
            "# OKR Risk Analysis Report\nGenerated: {}\n{}{}{}\nCompleted: {}\n",
            started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            SECTION_SEPARATOR,
            sections.join(SECTION_SEPARATOR),
            SECTION_SEPARATOR,
            finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }

    async fn run_phase(
        &self,
        phase: AnalysisPhase,
        user_request: &str,
        data: &AnalysisData,
        today: NaiveDate,
    ) -> String {
        let mut input = String::new();
        match phase {
            AnalysisPhase::Overview => input.push_str(user_request),
            _ => input.push_str(phase.prior_digest()),
        }

        let digest = match phase {
            AnalysisPhase::Overview => String::new(),
            AnalysisPhase::Risk => risk_digest(&data.key_results, today),
            AnalysisPhase::Overload | AnalysisPhase::Redistribution => {
                workload_digest(&data.members)
            }
        };
        if !digest.is_empty() {
            input.push_str("\n\n## Data digest\n");
            input.push_str(&digest);
        }

        let messages = [
            ChatMessage::system(phase.instructions()),
            ChatMessage::user(input),
        ];
        match timed_complete(self.gateway.as_ref(), &messages, true, self.timeout).await {
            Ok(outcome) => {
                for invocation in &outcome.invoked_functions {
                    debug!(
                        function = %invocation.name,
                        "{} phase consulted a data function",
                        phase.title()
                    );
                }
                outcome.text
            }
            Err(e) => {
                error!("{} phase failed: {}", phase.title(), e);
                format!("[{} failed: {}]", phase.title(), e)
            }
        }
    }
}

/// Textual risk digest fed to the Risk phase; not-computable entries are
/// listed separately and excluded from the risk list.
pub fn risk_digest(key_results: &[KeyResultProgress], today: NaiveDate) -> String {
    let mut digest = String::new();
    for progress in key_results {
        let line = match progress.risk(today) {
            RiskLevel::High => format!(
                "- HIGH RISK: \"{}\" ({}/{} tasks done)\n",
                progress.key_result.title, progress.completed_tasks, progress.total_tasks
            ),
            RiskLevel::AtRisk => format!(
                "- AT RISK: \"{}\" ({}/{} tasks done)\n",
                progress.key_result.title, progress.completed_tasks, progress.total_tasks
            ),
            RiskLevel::OnTrack => format!(
                "- on track: \"{}\" ({}/{} tasks done)\n",
                progress.key_result.title, progress.completed_tasks, progress.total_tasks
            ),
            RiskLevel::NotComputable => format!(
                "- not computable (no tasks or zero-length schedule): \"{}\"\n",
                progress.key_result.title
            ),
        };
        digest.push_str(&line);
    }
    digest
}

pub fn workload_digest(members: &[MemberLoad]) -> String {
    let mut digest = String::new();
    for load in members {
        let label = match load.workload() {
            WorkloadLevel::Overloaded => "OVERLOADED",
            WorkloadLevel::Balanced => "balanced",
            WorkloadLevel::Underutilized => "UNDERUTILIZED",
        };
        digest.push_str(&format!(
            "- {}: {} ({} active tasks, {} high priority)\n",
            load.member.name, label, load.active_tasks, load.high_priority_active
        ));
    }
    digest
}
