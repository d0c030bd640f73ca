//! Behavioural tests for the dispatcher.

mod support;
