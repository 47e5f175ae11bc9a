//! Behavioural scenarios for the cluster lifecycle on Hetzner Cloud.

mod lifecycle;
