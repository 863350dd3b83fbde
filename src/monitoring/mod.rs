//! 运行期观测：Prometheus 导出器的安装与开关。
//! 指标点位散落在聚合与报价方模块里，用 `magellan_` 前缀统一命名。

pub mod metrics;

pub use metrics::{prometheus_enabled, try_init_prometheus};
