//! Installs a signal handler which terminates the node on CTRL+C or SIGHUP.
//!
//! Forks an async task which waits for either **CTRL+C** or **SIGHUP** and then invokes
//! [Node::terminate](crate::node::Node::terminate) on the given node.
use std::sync::Arc;

use tokio::signal::unix::SignalKind;

use crate::node::Node;

/// Installs a signal handler for the given node which awaits either a **CTRL+C** or **SIGHUP**.
///
/// Note that this is automatically called by the [Builder](crate::builder::Builder) unless it is
/// disabled.
pub fn install(node: Arc<Node>) {
    crate::spawn!(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sig_hup = match tokio::signal::unix::signal(SignalKind::hangup()) {
            Ok(signal) => Some(signal),
            Err(error) => {
                log::error!("Cannot listen for SIGHUP: {}", error);
                None
            }
        };

        tokio::select! {
            _ = ctrl_c => {
                log::info!("Received CTRL-C. Shutting down...");
                node.terminate();
            },
            Some(_) = async {
                match sig_hup.as_mut() {
                    Some(signal) => signal.recv().await,
                    None => futures::future::pending().await,
                }
            } => {
                log::info!("Received SIGHUP. Shutting down...");
                node.terminate();
            }
        }
    });
}
