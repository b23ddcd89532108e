mod app;

slint::include_modules!();

extern crate pretty_env_logger;
#[macro_use] extern crate log;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use app::config::MapConfig;
use app::map::MapSession;

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    info!("Starting hazard map...");

    let config = MapConfig::load()?;
    info!(
        "Map mode {:?}, center {:?}, zoom {}, base layer {}",
        config.mode,
        config.center(),
        config.zoom(),
        config.base_layer().display_name()
    );
    let refresh_interval = config.refresh_interval();

    let main_window = MainWindow::new()?;

    // One runtime for all fetches made from the UI thread
    let rt = Rc::new(tokio::runtime::Runtime::new()?);

    let session = Rc::new(RefCell::new(MapSession::new(config)));
    {
        let session = session.borrow();
        session.setup_window(&main_window);
        session.present(&main_window);
    }

    app::map::setup_map_callbacks(&main_window, session.clone(), rt.clone());

    // Initial load once the event loop is running, so the loading status is visible
    let main_window_weak = main_window.as_weak();
    slint::Timer::single_shot(Duration::from_millis(100), move || {
        if let Some(window) = main_window_weak.upgrade() {
            window.invoke_refresh();
        }
    });

    if let Some(interval) = refresh_interval {
        spawn_refresh_timer(&main_window, interval);
    }

    info!("Hazard map started successfully");

    // Run the main window - this blocks until the window is closed
    main_window.run()?;

    info!("Main window closed, shutting down threads...");
    Ok(())
}

/// Ask the UI thread to refresh all feeds every `period`
fn spawn_refresh_timer(main_window: &MainWindow, period: Duration) {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to start refresh timer: {}", e);
                return;
            }
        };
        rt.block_on(async {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip immediate first trigger
            loop {
                interval.tick().await;
                if tx.send(()).is_err() {
                    // UI thread has shut down
                    break;
                }
            }
        });
    });

    let main_window_weak = main_window.as_weak();
    thread::spawn(move || {
        info!("Refresh thread started, every {:?}", period);
        while let Ok(()) = rx.recv() {
            let window_weak = main_window_weak.clone();
            let result = slint::invoke_from_event_loop(move || {
                if let Some(window) = window_weak.upgrade() {
                    window.invoke_refresh();
                }
            });
            if result.is_err() {
                // Event loop is gone
                break;
            }
        }
        info!("Refresh thread ended");
    });
}
