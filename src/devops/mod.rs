//! Azure DevOps integration module. Contains the REST client and the work item types returned to API callers.

pub mod client;
pub mod workitem;
