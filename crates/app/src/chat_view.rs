use eframe::egui;
use shared::{registry, Role};

use crate::state::AppState;

/// Synthetic system messages carry file contents for the model; the
/// scrollback shows a short notice instead of the full payload.
const FILE_NOTICE_PREFIX: &str = "### PROCESSED FILE";

pub fn show(ctx: &egui::Context, s: &mut AppState) {
    egui::CentralPanel::default().show(ctx, |ui| {
        let input_height = 80.0;
        let scroll_height = ui.available_height() - input_height;

        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .max_height(scroll_height)
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for msg in &s.session.messages {
                    match msg.role {
                        Role::User => {
                            bubble(ui, "You", &msg.content, egui::Color32::from_rgb(40, 60, 90));
                        }
                        Role::Assistant => {
                            let caption = msg
                                .model_used
                                .as_deref()
                                .map(registry::model_display_name)
                                .unwrap_or("Assistant");
                            bubble(ui, caption, &msg.content, egui::Color32::from_rgb(45, 45, 50));
                            if !msg.executed_tools.is_empty() {
                                ui.small(format!("{} tool call(s) executed", msg.executed_tools.len()));
                            }
                        }
                        Role::System => {
                            if msg.content.starts_with(FILE_NOTICE_PREFIX) {
                                ui.small("[document added to context]");
                            }
                        }
                    }
                    ui.add_space(6.0);
                }

                if s.is_thinking {
                    let text = if s.streaming_text.is_empty() {
                        "..."
                    } else {
                        s.streaming_text.as_str()
                    };
                    bubble(
                        ui,
                        registry::model_display_name(&s.session.context.model),
                        text,
                        egui::Color32::from_rgb(45, 45, 50),
                    );
                }
            });

        ui.separator();
        ui.horizontal(|ui| {
            let response = ui.add_sized(
                [ui.available_width() - 70.0, 48.0],
                egui::TextEdit::multiline(&mut s.input_text)
                    .hint_text("Type your message...")
                    .desired_rows(2),
            );
            let enter_pressed = response.has_focus()
                && ui.input(|i| i.key_pressed(egui::Key::Enter) && !i.modifiers.shift);
            let send_clicked = ui
                .add_enabled(!s.is_thinking, egui::Button::new("Send"))
                .clicked();
            if enter_pressed || send_clicked {
                s.send_message();
            }
        });
    });
}

fn bubble(ui: &mut egui::Ui, caption: &str, content: &str, fill: egui::Color32) {
    egui::Frame::none()
        .fill(fill)
        .rounding(egui::Rounding::same(8.0))
        .inner_margin(egui::Margin::same(8.0))
        .show(ui, |ui| {
            ui.set_width(ui.available_width());
            ui.small(caption);
            ui.label(content);
        });
}
