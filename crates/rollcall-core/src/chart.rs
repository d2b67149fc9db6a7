//! Attendance bar chart model. Every refresh replaces the data wholesale.

use crate::types::{AttendanceStats, StatsError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AttendanceChart {
    labels: Vec<String>,
    data: Vec<u64>,
    revision: u64,
}

impl AttendanceChart {
    pub fn new() -> Self {
        Self::default()
    }

    /// True until the first successful refresh.
    pub fn is_empty(&self) -> bool {
        self.revision == 0
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn data(&self) -> &[u64] {
        &self.data
    }

    /// Replace labels and data with `stats`. On error the previous chart is left intact.
    pub fn replace(&mut self, stats: AttendanceStats) -> Result<(), StatsError> {
        stats.validate()?;
        self.labels = stats.dates;
        self.data = stats.counts;
        self.revision += 1;
        Ok(())
    }

    /// Horizontal text bars, longest bar `width` cells wide.
    pub fn render_bars(&self, width: usize) -> String {
        let max = self.data.iter().copied().max().unwrap_or(0);
        let label_width = self.labels.iter().map(|l| l.len()).max().unwrap_or(0);
        let mut out = String::new();
        for (label, &count) in self.labels.iter().zip(&self.data) {
            let cells = if max == 0 {
                0
            } else {
                ((count as f64 / max as f64) * width as f64).round() as usize
            };
            out.push_str(&format!(
                "{label:<label_width$} | {}{} {count}\n",
                "#".repeat(cells),
                " ".repeat(width.saturating_sub(cells)),
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(dates: &[&str], counts: &[u64]) -> AttendanceStats {
        AttendanceStats {
            dates: dates.iter().map(|d| d.to_string()).collect(),
            counts: counts.to_vec(),
        }
    }

    #[test]
    fn test_refresh_replaces_not_merges() {
        let mut chart = AttendanceChart::new();
        assert!(chart.is_empty());

        chart
            .replace(stats(&["2025-01-01", "2025-01-02", "2025-01-03"], &[4, 5, 6]))
            .unwrap();
        assert_eq!(chart.revision(), 1);

        chart.replace(stats(&["2025-02-01"], &[9])).unwrap();
        assert_eq!(chart.labels(), ["2025-02-01"]);
        assert_eq!(chart.data(), [9]);
        assert_eq!(chart.revision(), 2);
    }

    #[test]
    fn test_bad_refresh_keeps_stale_chart() {
        let mut chart = AttendanceChart::new();
        chart.replace(stats(&["a", "b"], &[1, 2])).unwrap();
        assert!(chart.replace(stats(&["c"], &[1, 2])).is_err());
        assert_eq!(chart.labels(), ["a", "b"]);
        assert_eq!(chart.revision(), 1);
    }

    #[test]
    fn test_render_bars() {
        let mut chart = AttendanceChart::new();
        chart.replace(stats(&["mon", "tue"], &[2, 4])).unwrap();
        let text = chart.render_bars(4);
        assert_eq!(text, "mon | ##   2\ntue | #### 4\n");
    }

    #[test]
    fn test_render_all_zero() {
        let mut chart = AttendanceChart::new();
        chart.replace(stats(&["d"], &[0])).unwrap();
        assert_eq!(chart.render_bars(3), "d |     0\n");
    }
}
