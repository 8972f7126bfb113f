use eframe::egui;
use parking_lot::Mutex;
use std::sync::Arc;

mod chat_view;
mod sidebar;
mod state;

use state::AppState;

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 760.0])
            .with_min_inner_size([800.0, 600.0]),
        vsync: true,
        ..Default::default()
    };
    eframe::run_native(
        "PolyChat",
        options,
        Box::new(|_cc| {
            Box::new(PolyChatApp {
                state: Arc::new(Mutex::new(AppState::default())),
            })
        }),
    )
}

struct PolyChatApp {
    state: Arc<Mutex<AppState>>,
}

impl eframe::App for PolyChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut s = self.state.lock();

        // Non-blocking checks for background results
        s.poll_stream();
        s.poll_transcription();

        // Keep polling while anything is in flight
        if s.is_thinking || s.transcription_rx.is_some() {
            ctx.request_repaint();
        }

        sidebar::show(ctx, &mut s);
        chat_view::show(ctx, &mut s);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.state.lock().session.cleanup();
    }
}
