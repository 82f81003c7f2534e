mod support;

mod client_server;
mod forwarding;
mod lifecycle;
mod parallel_stress;
