//! External delivery channels for job outcomes.

pub mod webhook;
