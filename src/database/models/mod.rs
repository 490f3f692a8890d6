pub mod admin;
pub mod assignment;
pub mod evaluation;
pub mod school;
pub mod student;

pub use admin::{Admin, AdminView};
pub use assignment::AssignmentState;
pub use evaluation::{EvaluationCategory, EvaluationNode, EvaluationRow};
pub use school::School;
pub use student::{Student, StudentRow, StudentView};
