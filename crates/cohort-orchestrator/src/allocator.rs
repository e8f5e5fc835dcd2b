use cohort_core::{AllocationStrategy, Task, Teammate};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Chooses which idle teammate receives a task.
///
/// Holds one rotation cursor per team. The cursor is an index into the
/// team roster (as listed by the store) pointing just past the last
/// teammate picked; each pick scans forward from it and skips anyone who
/// is not idle. The lock is never held across an `.await`.
#[derive(Default)]
pub struct TaskAllocator {
    cursors: Mutex<HashMap<Uuid, usize>>,
}

impl TaskAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index into `roster` of the teammate that should take `task`, or
    /// `None` when nobody is idle.
    pub fn pick(
        &self,
        team_id: Uuid,
        strategy: AllocationStrategy,
        task: &Task,
        roster: &[Teammate],
    ) -> Option<usize> {
        if !roster.iter().any(Teammate::is_idle) {
            return None;
        }

        let picked = match strategy {
            AllocationStrategy::RoundRobin => self.rotate(team_id, roster, Teammate::is_idle),
            AllocationStrategy::LeastBusy => roster
                .iter()
                .enumerate()
                .filter(|(_, t)| t.is_idle())
                .min_by_key(|(idx, t)| (t.stats.finished(), *idx))
                .map(|(idx, _)| idx),
            AllocationStrategy::SkillMatch => {
                let text = task.text().to_lowercase();
                let scores: Vec<usize> = roster
                    .iter()
                    .map(|t| {
                        if t.is_idle() {
                            skill_score(t, &text)
                        } else {
                            0
                        }
                    })
                    .collect();
                let best = scores.iter().copied().max().unwrap_or(0);
                if best == 0 {
                    self.rotate(team_id, roster, Teammate::is_idle)
                } else {
                    // rotate among the best-scoring teammates
                    let mut idx = 0;
                    self.rotate(team_id, roster, |t| {
                        let hit = t.is_idle() && scores[idx] == best;
                        idx += 1;
                        hit
                    })
                }
            }
        };

        if let Some(idx) = picked {
            debug!(
                team_id = %team_id,
                task_id = %task.id,
                strategy = %strategy,
                teammate = %roster[idx].name,
                "allocator: teammate picked"
            );
        }
        picked
    }

    /// Current cursor for a team (0 before the first pick).
    pub fn cursor(&self, team_id: Uuid) -> usize {
        self.cursors.lock().get(&team_id).copied().unwrap_or(0)
    }

    /// Forget a team's rotation state.
    pub fn reset(&self, team_id: Uuid) {
        self.cursors.lock().remove(&team_id);
    }

    fn rotate<F>(&self, team_id: Uuid, roster: &[Teammate], mut eligible: F) -> Option<usize>
    where
        F: FnMut(&Teammate) -> bool,
    {
        let len = roster.len();
        if len == 0 {
            return None;
        }
        let flags: Vec<bool> = roster.iter().map(&mut eligible).collect();

        let mut cursors = self.cursors.lock();
        let cursor = cursors.entry(team_id).or_insert(0);
        let start = *cursor % len;
        let idx = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| flags[idx])?;
        *cursor = idx + 1;
        Some(idx)
    }
}

fn skill_score(teammate: &Teammate, lowered_text: &str) -> usize {
    teammate
        .skills
        .iter()
        .filter(|skill| !skill.is_empty() && lowered_text.contains(&skill.to_lowercase()))
        .count()
}
