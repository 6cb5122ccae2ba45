//! Session behaviour, driven over an in-memory transport.


mod flow_control;
mod going_away;
mod push;
mod streams;
