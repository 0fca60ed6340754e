//! Where things are on the portal.
//!
//! The layout is data, not code: selectors and URLs for the target report live
//! here so the driver and the orchestrator stay free of page specifics.

use crate::renderer::Target;
use serde::{Deserialize, Serialize};

/// Report kind exported by default.
pub const DEFAULT_REPORT_KIND: &str = "Packed";

/// URLs and element targets of the report portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalLayout {
    pub login_url: String,
    pub report_url: String,
    pub user_field: Target,
    pub password_field: Target,
    pub login_button: Target,
    /// Overlay that may appear after login; dismissed through its close control.
    pub post_login_overlay_close: Target,
    /// Overlay that may cover the report screen; dismissed with Escape.
    pub report_overlay: Target,
    pub export_button: Target,
    /// Dropdown inside the export dialog that reveals the report categories.
    pub category_dropdown: Target,
    pub confirm_button: Target,
    pub download_button: Target,
    /// File-name stem of the staged artifact.
    pub artifact_stem: String,
}

impl PortalLayout {
    /// Tree item selecting `report_kind` in the export dialog.
    pub fn report_item(&self, report_kind: &str) -> Target {
        Target::role_exact("treeitem", report_kind)
    }
}

impl Default for PortalLayout {
    fn default() -> Self {
        Self {
            login_url: "https://spx.shopee.com.br/".to_string(),
            report_url: "https://spx.shopee.com.br/#/general-to-management".to_string(),
            user_field: Target::placeholder("Ops ID"),
            password_field: Target::placeholder("Senha"),
            login_button: Target::xpath(
                "/html/body/div[1]/div/div[2]/div/div/div[1]/div[3]/form/div/div/button",
            ),
            post_login_overlay_close: Target::css(".ssc-dialog-close"),
            report_overlay: Target::css(".ssc-dialog-wrapper"),
            export_button: Target::role("button", "Exportar"),
            category_dropdown: Target::xpath("/html[1]/body[1]/span[4]/div[1]/div[1]/div[1]"),
            confirm_button: Target::role("button", "Confirmar"),
            download_button: Target::role("button", "Baixar"),
            artifact_stem: "TO-Packed".to_string(),
        }
    }
}
