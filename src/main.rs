use anyhow::Result;
use case_analysis::utils::logging;
use case_analysis::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let report = App::initialize(config).await?.run().await?;

    if report.summary.skipped > 0 {
        anyhow::bail!("运行被中断，{} 个文档未处理", report.summary.skipped);
    }

    Ok(())
}
