pub mod account_service;
pub mod admin_service;
pub mod assignment_service;
pub mod evaluation_service;
pub mod school_service;
pub mod student_service;
