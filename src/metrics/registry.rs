//! Metrics registry for the allocator, the slip service and the mail relay.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;

use super::Histogram;
use crate::contracts::SlipKind;
use crate::mail::SmtpFailure;

/// Central registry for every exported metric.
pub struct MetricsRegistry {
    pub allocation: AllocationMetrics,
    pub slips: SlipMetrics,
    pub mail: MailMetrics,
    start_time: Instant,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            allocation: AllocationMetrics::default(),
            slips: SlipMetrics::default(),
            mail: MailMetrics::default(),
            start_time: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Formats all metrics in Prometheus exposition format.
    ///
    /// `cas_conflicts` comes from the allocator, which counts its own lost races.
    pub fn format_prometheus(&self, cas_conflicts: u64) -> String {
        let mut output = String::with_capacity(4096);

        let _ = writeln!(output, "# HELP bordereau_uptime_secs Server uptime in seconds");
        let _ = writeln!(output, "# TYPE bordereau_uptime_secs gauge");
        let _ = writeln!(output, "bordereau_uptime_secs {:.3}", self.uptime_secs());
        output.push('\n');

        output.push_str(&self.allocation.format_prometheus(cas_conflicts));
        output.push_str(&self.slips.format_prometheus());
        output.push_str(&self.mail.format_prometheus());
        output
    }
}

fn counter(output: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(output, "# HELP {} {}", name, help);
    let _ = writeln!(output, "# TYPE {} counter", name);
    let _ = writeln!(output, "{} {}", name, value);
    output.push('\n');
}

/// Slip-number allocation metrics.
#[derive(Default)]
pub struct AllocationMetrics {
    /// Successful allocations per sequence
    pub allocations: DashMap<SlipKind, u64>,
    pub failures_total: AtomicU64,
    pub latency_us: Histogram,
}

impl AllocationMetrics {
    #[inline]
    pub fn record_success(&self, kind: SlipKind, latency_us: u64) {
        *self.allocations.entry(kind).or_insert(0) += 1;
        self.latency_us.observe(latency_us);
    }

    #[inline]
    pub fn record_failure(&self, latency_us: u64) {
        self.failures_total.fetch_add(1, Ordering::Relaxed);
        self.latency_us.observe(latency_us);
    }

    pub fn allocations_for(&self, kind: SlipKind) -> u64 {
        self.allocations.get(&kind).map(|v| *v).unwrap_or(0)
    }

    pub fn format_prometheus(&self, cas_conflicts: u64) -> String {
        let mut output = String::with_capacity(2048);

        let _ = writeln!(
            output,
            "# HELP bordereau_allocations_total Slip numbers issued per sequence"
        );
        let _ = writeln!(output, "# TYPE bordereau_allocations_total counter");
        for kind in SlipKind::ALL {
            let _ = writeln!(
                output,
                "bordereau_allocations_total{{type=\"{}\"}} {}",
                kind,
                self.allocations_for(kind)
            );
        }
        output.push('\n');

        counter(
            &mut output,
            "bordereau_allocation_failures_total",
            "Slip number allocations that failed",
            self.failures_total.load(Ordering::Relaxed),
        );
        counter(
            &mut output,
            "bordereau_allocation_conflicts_total",
            "Counter compare-and-swap attempts that lost a race",
            cas_conflicts,
        );

        output.push_str(&self.latency_us.format_prometheus(
            "bordereau_allocation_latency_us",
            "Slip number allocation latency in microseconds",
        ));
        output.push('\n');
        output
    }
}

/// Slip service metrics.
#[derive(Default)]
pub struct SlipMetrics {
    pub created_total: AtomicU64,
    pub updated_total: AtomicU64,
    pub errors_total: AtomicU64,
}

impl SlipMetrics {
    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(512);
        counter(
            &mut output,
            "bordereau_slips_created_total",
            "Slips created",
            self.created_total.load(Ordering::Relaxed),
        );
        counter(
            &mut output,
            "bordereau_slips_updated_total",
            "Slip updates and status changes",
            self.updated_total.load(Ordering::Relaxed),
        );
        counter(
            &mut output,
            "bordereau_slip_errors_total",
            "Failed slip operations",
            self.errors_total.load(Ordering::Relaxed),
        );
        output
    }
}

/// Mail relay metrics.
#[derive(Default)]
pub struct MailMetrics {
    pub sent_total: AtomicU64,
    /// Failures by classified cause
    pub failures: DashMap<SmtpFailure, u64>,
    pub send_latency_us: Histogram,
}

impl MailMetrics {
    #[inline]
    pub fn record_sent(&self, latency_us: u64) {
        self.sent_total.fetch_add(1, Ordering::Relaxed);
        self.send_latency_us.observe(latency_us);
    }

    #[inline]
    pub fn record_failure(&self, cause: SmtpFailure, latency_us: u64) {
        *self.failures.entry(cause).or_insert(0) += 1;
        self.send_latency_us.observe(latency_us);
    }

    pub fn failures_total(&self) -> u64 {
        self.failures.iter().map(|e| *e.value()).sum()
    }

    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);
        counter(
            &mut output,
            "bordereau_mail_sent_total",
            "Emails handed to SMTP successfully",
            self.sent_total.load(Ordering::Relaxed),
        );

        let _ = writeln!(
            output,
            "# HELP bordereau_mail_failures_total Failed email sends by cause"
        );
        let _ = writeln!(output, "# TYPE bordereau_mail_failures_total counter");
        let mut failures: Vec<(String, u64)> = self
            .failures
            .iter()
            .map(|e| (format!("{:?}", e.key()).to_lowercase(), *e.value()))
            .collect();
        failures.sort();
        for (cause, count) in failures {
            let _ = writeln!(
                output,
                "bordereau_mail_failures_total{{cause=\"{}\"}} {}",
                cause, count
            );
        }
        output.push('\n');

        output.push_str(&self.send_latency_us.format_prometheus(
            "bordereau_mail_send_latency_us",
            "Email send latency in microseconds",
        ));
        output.push('\n');
        output
    }
}
