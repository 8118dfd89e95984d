//! Shared UI icons and emojis.

use console::Emoji;

// Status indicators
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "[!]");

// Run phases
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static VERIFY: Emoji<'_, '_> = Emoji("🔍 ", "[?]");
pub static REVERT: Emoji<'_, '_> = Emoji("⏪ ", "[<]");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "[S]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
