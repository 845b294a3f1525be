use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::keys::EntityId;
use crate::model::StudentInput;
use crate::validation::{self, ValidationErrors};

const BIRTH_DATE_FORMAT: &str = "%Y-%m-%d";

pub const DEFAULT_WIZARD_IDLE: Duration = Duration::from_secs(30 * 60);
pub const MAX_OPEN_WIZARDS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Student,
    Guardian,
    Enrollment,
    Review,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Student, Step::Guardian, Step::Enrollment, Step::Review];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Student => "student",
            Step::Guardian => "guardian",
            Step::Enrollment => "enrollment",
            Step::Review => "review",
        }
    }

    fn next(self) -> Step {
        match self {
            Step::Student => Step::Guardian,
            Step::Guardian => Step::Enrollment,
            Step::Enrollment | Step::Review => Step::Review,
        }
    }

    fn prev(self) -> Step {
        match self {
            Step::Student | Step::Guardian => Step::Student,
            Step::Enrollment => Step::Guardian,
            Step::Review => Step::Enrollment,
        }
    }

    fn fields(self) -> &'static [&'static str] {
        match self {
            Step::Student => &["first_name", "last_name", "document_id", "birth_date"],
            Step::Guardian => &[
                "guardian_name",
                "guardian_phone",
                "guardian_relationship",
                "guardian_email",
            ],
            Step::Enrollment => &["classroom_id"],
            Step::Review => &[],
        }
    }
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("{} step has invalid fields", .step.as_str())]
    Invalid {
        step: Step,
        errors: ValidationErrors,
    },

    #[error("wizard is at the {} step", .actual.as_str())]
    WrongStep { expected: Step, actual: Step },
}

/// Student registration, one step at a time. Going back keeps what was entered.
#[derive(Debug, Clone)]
pub struct Wizard {
    id: Uuid,
    step: Step,
    data: serde_json::Map<String, serde_json::Value>,
    completed: BTreeSet<Step>,
}

impl Default for Wizard {
    fn default() -> Self {
        Wizard::new()
    }
}

impl Wizard {
    pub fn new() -> Self {
        Wizard {
            id: Uuid::new_v4(),
            step: Step::Student,
            data: serde_json::Map::new(),
            completed: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    #[cfg(test)]
    pub fn step(&self) -> Step {
        self.step
    }

    #[cfg(test)]
    pub fn data(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.data
    }

    /// Validates `fields` against the current step, stores them and moves on.
    /// On failure nothing is stored and the step does not change.
    pub fn submit_step(&mut self, fields: &serde_json::Value) -> Result<Step, WizardError> {
        let step = self.step;
        if step == Step::Review {
            return Err(WizardError::WrongStep {
                expected: Step::Enrollment,
                actual: step,
            });
        }
        let errors = check_step(step, fields);
        if !errors.is_empty() {
            return Err(WizardError::Invalid { step, errors });
        }
        for name in step.fields() {
            match fields.get(*name).and_then(|v| normalize(name, v)) {
                Some(value) => {
                    self.data.insert(name.to_string(), value);
                }
                None => {
                    self.data.remove(*name);
                }
            }
        }
        self.completed.insert(step);
        self.step = step.next();
        Ok(self.step)
    }

    pub fn back(&mut self) -> Step {
        self.step = self.step.prev();
        self.step
    }

    /// The registration payload; only available at `review`.
    pub fn student_input(&self) -> Result<StudentInput, WizardError> {
        if self.step != Step::Review {
            return Err(WizardError::WrongStep {
                expected: Step::Review,
                actual: self.step,
            });
        }
        serde_json::from_value(serde_json::Value::Object(self.data.clone())).map_err(|e| {
            let mut errors = ValidationErrors::default();
            errors.add("payload", e.to_string());
            WizardError::Invalid {
                step: Step::Review,
                errors,
            }
        })
    }

    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "wizardId": self.id,
            "step": self.step,
            "steps": Step::ALL,
            "completed": self.completed,
            "data": self.data,
        })
    }
}

struct Slot {
    wizard: Wizard,
    last_used: Instant,
}

/// Open wizards by id. A wizard nobody touched for `idle` is dropped, and
/// opening one past the cap drops the least recently used.
pub struct Wizards {
    slots: HashMap<Uuid, Slot>,
    idle: Duration,
    cap: usize,
}

impl Wizards {
    pub fn new(idle: Duration) -> Self {
        Wizards::with_cap(idle, MAX_OPEN_WIZARDS)
    }

    fn with_cap(idle: Duration, cap: usize) -> Self {
        Wizards {
            slots: HashMap::new(),
            idle,
            cap: cap.max(1),
        }
    }

    pub fn begin(&mut self) -> &Wizard {
        self.begin_at(Instant::now())
    }

    fn begin_at(&mut self, now: Instant) -> &Wizard {
        self.prune(now);
        if self.slots.len() >= self.cap {
            let oldest = self
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| *id);
            if let Some(id) = oldest {
                self.slots.remove(&id);
                debug!(wizard = %id, "evicted least recently used registration wizard");
            }
        }
        let wizard = Wizard::new();
        let slot = self.slots.entry(wizard.id()).or_insert(Slot {
            wizard,
            last_used: now,
        });
        &slot.wizard
    }

    /// Looks a wizard up and marks it as used.
    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Wizard> {
        self.get_mut_at(id, Instant::now())
    }

    fn get_mut_at(&mut self, id: &Uuid, now: Instant) -> Option<&mut Wizard> {
        self.prune(now);
        let slot = self.slots.get_mut(id)?;
        slot.last_used = now;
        Some(&mut slot.wizard)
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Wizard> {
        self.slots.remove(id).map(|slot| slot.wizard)
    }

    fn prune(&mut self, now: Instant) {
        let idle = self.idle;
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| now.saturating_duration_since(slot.last_used) < idle);
        let expired = before - self.slots.len();
        if expired > 0 {
            info!(expired, "dropped idle registration wizards");
        }
    }
}

fn check_step(step: Step, fields: &serde_json::Value) -> ValidationErrors {
    let mut errs = ValidationErrors::default();
    match step {
        Step::Student => {
            validation::require_text(fields, "first_name", &mut errs);
            validation::require_text(fields, "last_name", &mut errs);
            validation::require_text(fields, "document_id", &mut errs);
            check_birth_date(fields, &mut errs);
        }
        Step::Guardian => {
            validation::require_text(fields, "guardian_name", &mut errs);
            validation::require_text(fields, "guardian_phone", &mut errs);
            validation::require_text(fields, "guardian_relationship", &mut errs);
            validation::check_email(fields, "guardian_email", &mut errs);
        }
        Step::Enrollment => validation::require_id(fields, "classroom_id", &mut errs),
        Step::Review => {}
    }
    errs
}

fn check_birth_date(fields: &serde_json::Value, errs: &mut ValidationErrors) {
    let Some(raw) = fields
        .get("birth_date")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        errs.add("birth_date", "required");
        return;
    };
    match NaiveDate::parse_from_str(raw, BIRTH_DATE_FORMAT) {
        Ok(date) if date > Local::now().date_naive() => {
            errs.add("birth_date", "cannot be in the future")
        }
        Ok(_) => {}
        Err(_) => errs.add("birth_date", "expected YYYY-MM-DD"),
    }
}

/// Trims strings and drops blanks. `classroom_id` is stored as a number;
/// document ids and phones stay text even when they are all digits.
fn normalize(name: &str, value: &serde_json::Value) -> Option<serde_json::Value> {
    if name == "classroom_id" {
        return EntityId::from_json(value).map(|id| json!(id));
    }
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => {
            let t = s.trim();
            (!t.is_empty()).then(|| json!(t))
        }
        other => Some(other.clone()),
    }
}
