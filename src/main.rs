use std::sync::Arc;

use wa_inbox::api::client::ApiClient;
use wa_inbox::app::AppConfig;
use wa_inbox::inbox::Inbox;
use wa_inbox::locale::Locale;
use wa_inbox::scheduler::TokioScheduler;
use wa_inbox::ui::console::run_console;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load();
    let client = match ApiClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            log::error!("cannot start: {e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("cannot start async runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let locale = Locale::for_kind(config.locale);
        let (inbox, handle, events) = Inbox::new(Arc::new(client), locale);
        let inbox_task = tokio::spawn(inbox.run());

        log::info!("polling {} every {}s", config.base_url, config.poll_interval_secs);
        handle.refresh();
        let _poller = handle.poll_with(&TokioScheduler, config.poll_interval());

        run_console(handle, events, locale).await;
        if let Err(e) = inbox_task.await {
            log::error!("inbox loop ended abnormally: {e}");
        }
    });
}
