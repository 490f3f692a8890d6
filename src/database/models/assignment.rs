use sqlx::FromRow;

/// One `admin_school_map` row as seen by the reconciler: which school, and
/// whether the pairing is currently soft-deleted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AssignmentState {
    pub school_id: String,
    pub is_deleted: bool,
}
