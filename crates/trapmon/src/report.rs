//! Text rendering of cache state and batch results.

use std::fmt::Write;
use std::time::Duration;

use sonic_macresolver::{CacheEntryView, CacheStats, ResolutionResults};

pub fn format_stats(stats: &CacheStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Cache entries:  {}", stats.total_entries);
    let _ = writeln!(out, "  valid:        {}", stats.valid_entries);
    let _ = writeln!(out, "  expired:      {}", stats.expired_entries);
    let _ = writeln!(
        out,
        "Hit ratio:      {:.1}% ({} hits, {} misses)",
        stats.hit_ratio() * 100.0,
        stats.hits,
        stats.misses
    );
    out
}

pub fn format_entry(entry: &CacheEntryView) -> String {
    format!(
        "{:<32} {}  age {:>4}s  {}",
        entry.key.to_string(),
        entry.mac,
        entry.age.as_secs(),
        if entry.valid { "valid" } else { "expired" }
    )
}

/// Renders results sorted by request id.
pub fn format_results(results: &ResolutionResults, elapsed: Duration) -> String {
    let mut ids: Vec<&String> = results.keys().collect();
    ids.sort();

    let mut out = String::new();
    for id in ids {
        let mac = results[id]
            .map(|mac| mac.to_string())
            .unwrap_or_else(|| "not found".to_string());
        let _ = writeln!(out, "{:<32} {}", id, mac);
    }
    let resolved = results.values().filter(|mac| mac.is_some()).count();
    let _ = writeln!(
        out,
        "Resolved {}/{} in {:.2}s",
        resolved,
        results.len(),
        elapsed.as_secs_f64()
    );
    out
}

/// Returns the last `n` lines of `content`.
pub fn last_lines(content: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_macresolver::CacheKey;

    #[test]
    fn test_format_stats() {
        let stats = CacheStats {
            total_entries: 3,
            valid_entries: 2,
            expired_entries: 1,
            hits: 3,
            misses: 1,
        };
        let text = format_stats(&stats);
        assert!(text.contains("Cache entries:  3"));
        assert!(text.contains("expired:      1"));
        assert!(text.contains("75.0% (3 hits, 1 misses)"));
    }

    #[test]
    fn test_format_entry() {
        let entry = CacheEntryView {
            key: CacheKey::new("2001:db8::1", 10, "public"),
            mac: "00:11:22:33:44:55".parse().unwrap(),
            age: Duration::from_secs(12),
            valid: true,
        };
        let line = format_entry(&entry);
        assert!(line.starts_with("2001:db8::1:10"));
        assert!(line.contains("00:11:22:33:44:55"));
        assert!(line.contains("age   12s"));
        assert!(line.ends_with("valid"));
    }

    #[test]
    fn test_format_results() {
        let mut results = ResolutionResults::new();
        results.insert("b:11".to_string(), None);
        results.insert("a:10".to_string(), Some("00:11:22:33:44:55".parse().unwrap()));
        let text = format_results(&results, Duration::from_millis(1500));
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("a:10"));
        assert!(lines[1].ends_with("not found"));
        assert_eq!(lines[2], "Resolved 1/2 in 1.50s");
    }

    #[test]
    fn test_last_lines() {
        let content = "one\ntwo\nthree\n";
        assert_eq!(last_lines(content, 2), vec!["two", "three"]);
        assert_eq!(last_lines(content, 10), vec!["one", "two", "three"]);
        assert!(last_lines("", 5).is_empty());
    }
}
