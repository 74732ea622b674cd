//! # Unit Locator Library
//!
//! Record where fleet units (trailers) are parked, online or not.
//!
//! This library provides the location-capture workflow behind the
//! `unit-locator` binary:
//! - Position sampling with accuracy tracking ([`geolocation`])
//! - Manual pin placement when the device can't get a good fix
//! - A durable offline queue for captures taken without connectivity ([`queue`])
//! - Submission to the hosted store, with queue fallback ([`pipeline`])
//! - Connectivity tracking and queue replay on reconnect ([`connectivity`])

pub mod backend;
pub mod capture;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod geolocation;
pub mod pipeline;
pub mod queue;
