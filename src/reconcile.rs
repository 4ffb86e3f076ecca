use crate::records::AssignmentLink;
use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("teacher {teacher_id} is already linked to class {class_id}")]
    DuplicateAssignment { teacher_id: String, class_id: String },
    #[error("teacher {teacher_id} is not linked to class {class_id}")]
    AssignmentNotFound { teacher_id: String, class_id: String },
    #[error("reconciliation failed: {0}")]
    ReconciliationFailed(String),
    #[error("{0}")]
    Store(String),
}

impl AssignmentError {
    pub fn code(&self) -> &'static str {
        match self {
            AssignmentError::DuplicateAssignment { .. } => "duplicate_assignment",
            AssignmentError::AssignmentNotFound { .. } => "assignment_not_found",
            AssignmentError::ReconciliationFailed(_) => "reconciliation_failed",
            AssignmentError::Store(_) => "db_query_failed",
        }
    }
}

impl From<rusqlite::Error> for AssignmentError {
    fn from(e: rusqlite::Error) -> Self {
        AssignmentError::Store(e.to_string())
    }
}

/// Minimal set of writes that turns one teacher's links into the desired set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationPlan {
    pub teacher_id: String,
    pub to_add: BTreeSet<String>,
    pub to_remove: Vec<AssignmentLink>,
    pub to_keep: Vec<AssignmentLink>,
}

impl ReconciliationPlan {
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub added: usize,
    pub removed: usize,
    pub kept: usize,
    pub added_links: Vec<AssignmentLink>,
}

pub fn reconcile(
    teacher_id: &str,
    desired_class_ids: &[String],
    actual: &[AssignmentLink],
) -> ReconciliationPlan {
    let desired: BTreeSet<&str> = desired_class_ids.iter().map(|s| s.as_str()).collect();
    let linked: BTreeSet<&str> = actual.iter().map(|l| l.class_id.as_str()).collect();

    let to_add = desired
        .difference(&linked)
        .map(|s| s.to_string())
        .collect();

    let (mut to_keep, mut to_remove): (Vec<AssignmentLink>, Vec<AssignmentLink>) = actual
        .iter()
        .cloned()
        .partition(|l| desired.contains(l.class_id.as_str()));
    to_keep.sort_by(|a, b| a.class_id.cmp(&b.class_id));
    to_remove.sort_by(|a, b| a.class_id.cmp(&b.class_id));

    ReconciliationPlan {
        teacher_id: teacher_id.to_string(),
        to_add,
        to_remove,
        to_keep,
    }
}

/// Writes available inside a unit of work.
pub trait LinkWriter {
    fn insert_link(&mut self, teacher_id: &str, class_id: &str)
        -> Result<AssignmentLink, AssignmentError>;
    fn delete_link(&mut self, link_id: &str) -> Result<(), AssignmentError>;
}

pub trait LinkStore {
    fn links_for_teacher(&self, teacher_id: &str) -> Result<Vec<AssignmentLink>, AssignmentError>;

    fn find_link(
        &self,
        teacher_id: &str,
        class_id: &str,
    ) -> Result<Option<AssignmentLink>, AssignmentError>;

    /// Runs `work` all-or-nothing: committed when it returns `Ok`, rolled
    /// back otherwise.
    fn unit_of_work<T, F>(&self, work: F) -> Result<T, AssignmentError>
    where
        F: FnOnce(&mut dyn LinkWriter) -> Result<T, AssignmentError>;
}

pub struct SqliteLinkStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteLinkStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

struct TxWriter<'t, 'c> {
    tx: &'t Transaction<'c>,
}

impl LinkWriter for TxWriter<'_, '_> {
    fn insert_link(
        &mut self,
        teacher_id: &str,
        class_id: &str,
    ) -> Result<AssignmentLink, AssignmentError> {
        let id = Uuid::new_v4().to_string();
        match self.tx.execute(
            "INSERT INTO teacher_classes(id, teacher_id, class_id) VALUES(?, ?, ?)",
            (&id, teacher_id, class_id),
        ) {
            Ok(_) => {}
            // UNIQUE(teacher_id, class_id) holds even when a concurrent writer
            // linked the pair after our lookup.
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(AssignmentError::DuplicateAssignment {
                    teacher_id: teacher_id.to_string(),
                    class_id: class_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
        Ok(AssignmentLink {
            id,
            teacher_id: teacher_id.to_string(),
            class_id: class_id.to_string(),
        })
    }

    fn delete_link(&mut self, link_id: &str) -> Result<(), AssignmentError> {
        let n = self
            .tx
            .execute("DELETE FROM teacher_classes WHERE id = ?", [link_id])?;
        if n == 0 {
            return Err(AssignmentError::Store(format!(
                "link {} no longer exists",
                link_id
            )));
        }
        Ok(())
    }
}

impl LinkStore for SqliteLinkStore<'_> {
    fn links_for_teacher(&self, teacher_id: &str) -> Result<Vec<AssignmentLink>, AssignmentError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, teacher_id, class_id
             FROM teacher_classes
             WHERE teacher_id = ?
             ORDER BY class_id",
        )?;
        let links = stmt
            .query_map([teacher_id], |r| {
                Ok(AssignmentLink {
                    id: r.get(0)?,
                    teacher_id: r.get(1)?,
                    class_id: r.get(2)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(links)
    }

    fn find_link(
        &self,
        teacher_id: &str,
        class_id: &str,
    ) -> Result<Option<AssignmentLink>, AssignmentError> {
        let link = self
            .conn
            .query_row(
                "SELECT id, teacher_id, class_id
                 FROM teacher_classes
                 WHERE teacher_id = ? AND class_id = ?",
                (teacher_id, class_id),
                |r| {
                    Ok(AssignmentLink {
                        id: r.get(0)?,
                        teacher_id: r.get(1)?,
                        class_id: r.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(link)
    }

    fn unit_of_work<T, F>(&self, work: F) -> Result<T, AssignmentError>
    where
        F: FnOnce(&mut dyn LinkWriter) -> Result<T, AssignmentError>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let result = {
            let mut writer = TxWriter { tx: &tx };
            work(&mut writer)
        };
        match result {
            Ok(v) => {
                tx.commit()?;
                Ok(v)
            }
            Err(e) => {
                let _ = tx.rollback();
                Err(e)
            }
        }
    }
}

/// Applies a plan as one unit of work. Any failure leaves the store as it was.
pub fn apply<S: LinkStore>(
    store: &S,
    plan: &ReconciliationPlan,
) -> Result<ApplyOutcome, AssignmentError> {
    let added_links = store
        .unit_of_work(|w| {
            for link in &plan.to_remove {
                w.delete_link(&link.id)?;
            }
            let mut added = Vec::with_capacity(plan.to_add.len());
            for class_id in &plan.to_add {
                added.push(w.insert_link(&plan.teacher_id, class_id)?);
            }
            Ok(added)
        })
        .map_err(|e| {
            warn!(
                teacher_id = %plan.teacher_id,
                error = %e,
                "assignment reconciliation rolled back"
            );
            AssignmentError::ReconciliationFailed(e.to_string())
        })?;

    let outcome = ApplyOutcome {
        added: added_links.len(),
        removed: plan.to_remove.len(),
        kept: plan.to_keep.len(),
        added_links,
    };
    info!(
        teacher_id = %plan.teacher_id,
        added = outcome.added,
        removed = outcome.removed,
        kept = outcome.kept,
        "assignments reconciled"
    );
    Ok(outcome)
}

pub fn link<S: LinkStore>(
    store: &S,
    teacher_id: &str,
    class_id: &str,
) -> Result<AssignmentLink, AssignmentError> {
    if store.find_link(teacher_id, class_id)?.is_some() {
        return Err(AssignmentError::DuplicateAssignment {
            teacher_id: teacher_id.to_string(),
            class_id: class_id.to_string(),
        });
    }
    store.unit_of_work(|w| w.insert_link(teacher_id, class_id))
}

pub fn unlink<S: LinkStore>(
    store: &S,
    teacher_id: &str,
    class_id: &str,
) -> Result<AssignmentLink, AssignmentError> {
    let Some(existing) = store.find_link(teacher_id, class_id)? else {
        return Err(AssignmentError::AssignmentNotFound {
            teacher_id: teacher_id.to_string(),
            class_id: class_id.to_string(),
        });
    };
    store.unit_of_work(|w| w.delete_link(&existing.id))?;
    Ok(existing)
}
