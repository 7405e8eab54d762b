use indicatif::{ProgressBar, ProgressStyle};

/// Progress over a batch of `total` records; hidden when `silent`
pub(crate) fn bar(total: usize, silent: bool) -> ProgressBar {
    if silent {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "[{elapsed_precise}] {spinner:.cyan} {bar:40.cyan/blue} {pos}/{len} {msg}",
    ) {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]));
    }
    pb.set_message("Processing entries");
    pb
}
