use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::U256;
use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use time::{UtcOffset, macros::format_description};
use tracing::{info, warn};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{EnvFilter, fmt};

mod chain;
mod config;
mod engine;
mod fees;
mod monitoring;
mod providers;

use chain::{ChainHealth, ChainId, builtin_descriptor, units};
use config::{ChainSettings, GlobalConfig, MagellanConfig, load_config, write_template};
use engine::{SwapEngine, SwapRequest};
use fees::{InMemoryDirectory, Tier, UserDirectory};

#[derive(Parser, Debug)]
#[command(name = "magellan", version, about = "多链报价聚合与路由引擎")]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径（默认查找 magellan.toml 或 config/magellan.toml）"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 对指定链发起一轮报价聚合
    Quote(QuoteCmd),
    /// 列出注册链的健康状态与报价方
    Chains,
    /// 演算一笔已实现利润的费用拆分
    Fee(FeeCmd),
    /// 初始化配置模版文件
    Init(InitCmd),
}

#[derive(Args, Debug)]
struct QuoteCmd {
    #[arg(long, help = "链名称，如 ethereum / solana / sui / ckb")]
    chain: ChainId,
    #[arg(long, help = "输入代币地址（原生代币用哨兵地址）")]
    input: String,
    #[arg(long, help = "输出代币地址")]
    output: String,
    #[arg(long, help = "交易数量（原始单位）")]
    amount: String,
    #[arg(long, default_value_t = 50, help = "允许滑点（基点）")]
    slippage_bps: u16,
    #[arg(long, help = "兑换产物接收地址")]
    recipient: String,
    #[arg(long, help = "选出后立即确认并输出未签名交易")]
    confirm: bool,
}

#[derive(Args, Debug)]
struct FeeCmd {
    #[arg(long, help = "已实现利润（计价货币原始单位，可为负）")]
    profit: i128,
    #[arg(long, default_value = "free", help = "用户等级 free/holder/staker/enterprise")]
    tier: Tier,
    #[arg(long, help = "推荐人近 7 日交易量（缺省表示无推荐关系）")]
    referrer_volume: Option<u128>,
}

#[derive(Args, Debug)]
struct InitCmd {
    #[arg(long, value_name = "DIR", help = "可选输出目录（默认当前目录）")]
    output: Option<PathBuf>,
    #[arg(long, help = "若文件存在则覆盖")]
    force: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.clone())?;
    init_tracing(&config.global)?;

    if !config.global.prometheus_listen.is_empty() {
        if let Err(err) = monitoring::try_init_prometheus(&config.global.prometheus_listen) {
            warn!(target: "main", error = %err, "Prometheus 导出器启动失败，继续运行");
        }
    }

    match cli.command {
        Command::Quote(cmd) => run_quote(config, cmd).await,
        Command::Chains => run_chains(config).await,
        Command::Fee(cmd) => run_fee(config, cmd).await,
        Command::Init(cmd) => {
            let path = write_template(cmd.output, cmd.force)?;
            println!("已写出配置模板: {}", path.display());
            Ok(())
        }
    }
}

async fn run_quote(mut config: MagellanConfig, cmd: QuoteCmd) -> Result<()> {
    // 单链查询没必要初始化其它链
    restrict_to_chain(&mut config, cmd.chain);
    let engine = bootstrap_engine(&config).await?;

    let amount = cmd
        .amount
        .parse::<U256>()
        .map_err(|err| anyhow!("amount {} 解析失败: {err}", cmd.amount))?;
    let request = SwapRequest::new(
        cmd.chain,
        cmd.input,
        cmd.output,
        amount,
        cmd.slippage_bps,
        cmd.recipient,
    );

    let selected = engine.get_quote(&request).await?;
    let descriptor = builtin_descriptor(cmd.chain);
    println!("quote id     : {}", selected.id);
    println!("venue        : {}", selected.quote.venue);
    println!("amount in    : {}", selected.request.amount_in);
    println!("amount out   : {}", selected.quote.out_amount);
    println!("min output   : {}", selected.min_output);
    match selected.rate {
        Some(rate) => println!("rate         : {rate}"),
        None => println!("rate         : n/a"),
    }
    println!("gas estimate : {}", selected.quote.gas_estimate);
    println!("price impact : {}%", selected.quote.price_impact_pct);
    println!("expires at   : {} (unix ms)", selected.expires_at_ms);
    for (index, hop) in selected.quote.route.iter().enumerate() {
        println!(
            "route[{index}]     : {} {}% {} -> {} ({})",
            hop.venue_label, hop.percent, hop.input_token, hop.output_token, hop.pool
        );
    }
    println!(
        "native value : {} {}",
        units::format_units(
            if descriptor.is_native(&selected.request.input_token) {
                selected.request.amount_in
            } else {
                U256::ZERO
            },
            descriptor.native_decimals
        ),
        descriptor.native_symbol
    );

    if cmd.confirm {
        let tx = engine.confirm_quote(&selected.id).await?;
        println!("-- unsigned transaction --");
        println!("to    : {}", tx.to);
        println!("value : {}", tx.value);
        println!("data  : {}", tx.data);
    }
    engine.shutdown().await;
    Ok(())
}

async fn run_chains(config: MagellanConfig) -> Result<()> {
    let engine = bootstrap_engine(&config).await?;
    for entry in engine.health_report() {
        let status = match &entry.health {
            ChainHealth::Up => "up".to_string(),
            ChainHealth::Down(reason) => format!("down ({reason})"),
        };
        let venues = entry
            .venues
            .iter()
            .map(|venue| venue.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!("{:<10} {:<24} [{venues}]", entry.chain.to_string(), status);
    }
    engine.shutdown().await;
    Ok(())
}

async fn run_fee(config: MagellanConfig, cmd: FeeCmd) -> Result<()> {
    // 离线演算不需要任何链上连接
    let mut directory = InMemoryDirectory::new().with_tier("local", cmd.tier);
    if let Some(volume) = cmd.referrer_volume {
        directory = directory
            .with_referrer("local", "referrer")
            .with_volume("referrer", volume);
    }
    let directory: Arc<dyn UserDirectory> = Arc::new(directory);
    let fees = fees::FeeEngine::new(
        directory,
        config.fees.tiers.clone(),
        config.fees.referrals.clone(),
    );

    let breakdown = fees.compute_fee_for_user("local", cmd.profit).await;
    println!("tier          : {}", breakdown.tier);
    println!("effective bps : {}", breakdown.effective_bps);
    match breakdown.referral_tier {
        Some(tier) => println!("referral tier : {tier}"),
        None => println!("referral tier : none"),
    }
    println!("profit        : {}", cmd.profit);
    println!("fee           : {}", breakdown.result.fee);
    println!("net profit    : {}", breakdown.result.net_profit);
    println!("referral pay  : {}", breakdown.result.referral_reward);
    println!("protocol take : {}", breakdown.result.protocol_take);
    Ok(())
}

async fn bootstrap_engine(config: &MagellanConfig) -> Result<SwapEngine> {
    let directory: Arc<dyn UserDirectory> = Arc::new(InMemoryDirectory::new());
    let engine = engine::bootstrap(config, directory).await?;
    info!(target: "main", chains = engine.health_report().len(), "引擎启动完成");
    Ok(engine)
}

fn restrict_to_chain(config: &mut MagellanConfig, keep: ChainId) {
    for chain in ChainId::ALL {
        if *chain != keep {
            let entry = config
                .chains
                .entry(chain.as_str().to_string())
                .or_insert_with(ChainSettings::default);
            entry.enabled = false;
        }
    }
}

/// 初始化 tracing，默认压低 HTTP 栈的调试输出。
fn init_tracing(config: &GlobalConfig) -> Result<()> {
    let mut filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    const QUIET_TARGETS: &[(&str, &str)] = &[
        ("hyper", "warn"),
        ("hyper_util::client::legacy", "warn"),
        ("reqwest", "info"),
    ];
    for (module, level) in QUIET_TARGETS {
        if !config.log_level.contains(module) {
            if let Ok(directive) = format!("{module}={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    let time_format =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");
    let offset = UtcOffset::from_hms(config.timezone_offset_hours, 0, 0)
        .map_err(|err| anyhow!("非法的时区偏移 {}: {err}", config.timezone_offset_hours))?;
    fmt()
        .with_env_filter(filter)
        .with_timer(OffsetTime::new(offset, time_format))
        .init();
    Ok(())
}
