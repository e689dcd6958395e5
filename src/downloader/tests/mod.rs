use super::test_helpers::*;
use super::*;
use crate::error::Error;
use crate::retry::RetryDecision;
use crate::types::{Event, Stage, Status};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
