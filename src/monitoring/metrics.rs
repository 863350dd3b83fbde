use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;

static INSTALL: OnceCell<()> = OnceCell::new();
static ENABLED: AtomicBool = AtomicBool::new(false);

/// 安装 Prometheus 导出器并登记指标说明。重复调用是幂等的。
pub fn try_init_prometheus(listen: &str) -> Result<()> {
    INSTALL
        .get_or_try_init(|| {
            let addr: SocketAddr = listen
                .parse()
                .with_context(|| format!("invalid prometheus listen address: {listen}"))?;
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("failed to install prometheus exporter")?;
            describe_counter!(
                "magellan_quotes_selected_total",
                "按 venue 统计的胜出报价数"
            );
            describe_counter!(
                "magellan_quote_absent_total",
                "按 venue 与原因统计的缺席报价数"
            );
            describe_counter!(
                "magellan_no_liquidity_total",
                "按链统计的整轮无流动性次数"
            );
            describe_histogram!(
                "magellan_aggregate_duration_ms",
                "单轮聚合耗时（毫秒）"
            );
            ENABLED.store(true, Ordering::Relaxed);
            Ok(())
        })
        .map(|_| ())
}

/// 指标点位用它做旁路开关，未启用导出时不产生记录开销。
pub fn prometheus_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}
