use std::collections::HashSet;

use log::debug;

use crate::models::TabId;

/// Glyph shown on the toolbar action while a video is associated with a tab.
pub const BADGE_DOT: &str = "●";

/// Per-tab badge projection. Purely derived from stored-context presence;
/// never authoritative on its own.
#[derive(Debug, Default)]
pub struct BadgeRegistry {
    active: HashSet<TabId>,
}

impl BadgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_present(&mut self, tab_id: TabId) {
        if self.active.insert(tab_id) {
            debug!("badge set for tab {tab_id}");
        }
    }

    pub fn clear(&mut self, tab_id: TabId) {
        if self.active.remove(&tab_id) {
            debug!("badge cleared for tab {tab_id}");
        }
    }

    pub fn is_present(&self, tab_id: TabId) -> bool {
        self.active.contains(&tab_id)
    }

    pub fn text(&self, tab_id: TabId) -> &'static str {
        if self.is_present(tab_id) {
            BADGE_DOT
        } else {
            ""
        }
    }
}
