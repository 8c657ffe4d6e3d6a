// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared record, window-planning, and retry types for the history harvester.

pub mod record;
pub mod retry;
pub mod window;
