//! Gymdesk — authentication and session lifecycle for the gym
//! member-management app.
//!
//! ARCHITECTURE
//! ============
//! Leaf to root: the backend adapter (`backend`) talks to the hosted auth
//! and table API; the session store mirrors the adapter's session; the
//! recovery controller repairs broken connections; the provisioning service
//! guarantees one gym per identity; the auth facade composes all of them
//! into the operations the UI calls; the route guard gates protected views.
//!
//! Backend auth events flow into the session store, and every consumer reads
//! auth state from that one store.

pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod gyms;
pub mod members;
pub mod notify;
pub mod services;
pub mod state;
pub mod storage;
