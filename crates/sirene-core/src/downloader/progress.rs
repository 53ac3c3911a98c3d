//! Byte-level progress bars for transfers with a known length.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const TEMPLATE: &str =
    "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}";

/// A bar for `total` bytes labelled with the file name. Added to `group` when
/// several transfers run at once so their bars do not overwrite each other.
pub(crate) fn transfer_bar(total: u64, label: &str, group: Option<&MultiProgress>) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let bar = match group {
        Some(multi) => multi.add(bar),
        None => bar,
    };
    let style = ProgressStyle::with_template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    bar.set_style(style);
    bar.set_prefix(label.to_string());
    bar
}
