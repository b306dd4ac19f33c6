//! Startup reinstallation of persisted triggers.
//!
//! Handler state is in-memory only, so a process restart loses every
//! installed trigger while the platform may still hold alarms and menu items
//! from the previous life. Bootstrap first wipes that stale platform state,
//! then reinstalls every enabled trigger from the store.

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::TriggerError;
use crate::platform::{AlarmApi, MenuApi};
use crate::traits::TriggersStore;
use crate::triggers::HandlerRegistry;

/// Clear stale platform registrations and reinstall every enabled trigger.
/// A trigger that fails to install is logged and skipped so one bad spec
/// cannot block the rest. Returns the number of triggers installed.
pub async fn reinstall_enabled_triggers(
    registry: &HandlerRegistry,
    triggers: &Arc<dyn TriggersStore>,
    alarms: &Arc<dyn AlarmApi>,
    menus: &Arc<dyn MenuApi>,
) -> Result<usize, TriggerError> {
    alarms.clear_all().await?;
    menus.remove_all().await?;

    let specs = triggers.list().await?;

    let mut installed = 0;
    for spec in specs {
        if !spec.enabled {
            continue;
        }
        let handler = match registry.get(spec.kind()) {
            Some(handler) => handler,
            None => {
                warn!(trigger_id = %spec.id, kind = %spec.kind(), "no handler for trigger kind, skipping");
                continue;
            }
        };
        match handler.install(&spec).await {
            Ok(()) => installed += 1,
            Err(error) => {
                warn!(trigger_id = %spec.id, kind = %spec.kind(), %error, "failed to reinstall trigger, skipping");
            }
        }
    }

    info!(installed, "trigger bootstrap complete");
    Ok(installed)
}
