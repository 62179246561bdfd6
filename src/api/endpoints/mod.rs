pub mod checklist;
pub mod health;
