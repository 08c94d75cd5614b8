//! Poll request handling.
//!
//! The thin boundary in front of the long-poll coordinator: shape-check the
//! envelope, resolve the device, its app install, the application, and the
//! token material, and reject with a coded payload at the first violation.
//! Authentication is assumed to have happened before this worker runs.

use std::sync::Arc;

use tracing::{debug, warn};

use dmp_proto::{
    PollReply, PollRequest, Rejection, CODE_APP_NOT_REGISTERED, CODE_MALFORMED_REQUEST,
    CODE_MISSING_TOKENS, CODE_STORE_ACTIONS, CODE_STORE_APPLICATIONS, CODE_STORE_DEVICES,
    CODE_UNKNOWN_APPLICATION, CODE_UNKNOWN_DEVICE,
};

use crate::db::{AppInstall, DirectoryStore};
use crate::longpoll::LongPollCoordinator;

/// The nonce stamped on every poll reply.
///
/// Poll replies are not nonce-chained; the reply encoder derives freshness
/// from the session, so the wire field is a constant zero.
const REPLY_NONCE: u64 = 0;

/// Serves validated poll requests.
pub struct PollHandler {
    directory: Arc<dyn DirectoryStore>,
    coordinator: LongPollCoordinator,
}

impl PollHandler {
    pub fn new(directory: Arc<dyn DirectoryStore>, coordinator: LongPollCoordinator) -> Self {
        Self {
            directory,
            coordinator,
        }
    }

    /// Handle one poll request end to end.
    ///
    /// Every rejection terminates the request without retry; nothing here
    /// is fatal to the process.
    pub async fn handle(&self, mut request: PollRequest) -> Result<PollReply, Rejection> {
        if let Err(e) = request.validate() {
            return Err(Rejection::error(CODE_MALFORMED_REQUEST, e.to_string()));
        }

        let device_id = request.header.device_id.clone();
        let tokencard_id = request.header.encryption.tokencard_id.clone();

        let device = self
            .directory
            .device(&device_id)
            .await
            .map_err(|e| Rejection::error(CODE_STORE_DEVICES, e.to_string()))?
            .ok_or_else(|| {
                Rejection::warning(
                    CODE_UNKNOWN_DEVICE,
                    "The device-id does not exist. Please register first.",
                )
            })?;

        let install = device.apps.get(&tokencard_id).ok_or_else(|| {
            Rejection::warning(
                CODE_APP_NOT_REGISTERED,
                "This application has not been registered. Please register first.",
            )
        })?;

        // The install record must take the expected shape before the device
        // may poll through it.
        if let Err(e) = serde_json::from_value::<AppInstall>(install.clone()) {
            warn!(
                device_id = %device_id,
                tokencard_id = %tokencard_id,
                error = %e,
                "Rejecting poll with a malformed app install record"
            );
            return Err(Rejection::error(CODE_MALFORMED_REQUEST, e.to_string()));
        }

        let application = self
            .directory
            .application(&tokencard_id)
            .await
            .map_err(|e| Rejection::error(CODE_STORE_APPLICATIONS, e.to_string()))?
            .ok_or_else(|| {
                Rejection::error(CODE_UNKNOWN_APPLICATION, "The application is not defined.")
            })?;

        // Token material is consumed by the reply encoder; the poll only
        // proceeds when it exists.
        let tokens_defined = application
            .tokens
            .as_ref()
            .is_some_and(|tokens| !tokens.is_empty());
        if !tokens_defined {
            return Err(Rejection::error(
                CODE_MISSING_TOKENS,
                "The application tokens are not defined.",
            ));
        }

        let outcome = self
            .coordinator
            .poll(&mut request)
            .await
            .map_err(|e| Rejection::error(CODE_STORE_ACTIONS, e.to_string()))?;

        debug!(
            device_id = %device_id,
            tokencard_id = %tokencard_id,
            delivered = outcome.actions.len(),
            encryption = %outcome.encryption,
            "Poll served"
        );

        Ok(PollReply::new(
            device_id,
            tokencard_id,
            outcome.encryption,
            REPLY_NONCE,
            outcome.actions,
        ))
    }
}
