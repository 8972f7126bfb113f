use eframe::egui;
use ingest::generator::GeneratedFileKind;
use shared::registry;

use crate::state::AppState;

const KIND_CHOICES: &[GeneratedFileKind] = &[
    GeneratedFileKind::Text,
    GeneratedFileKind::Markdown,
    GeneratedFileKind::Json,
    GeneratedFileKind::Csv,
    GeneratedFileKind::Spreadsheet,
    GeneratedFileKind::Html,
    GeneratedFileKind::Css,
    GeneratedFileKind::JavaScript,
    GeneratedFileKind::Code,
];

pub fn show(ctx: &egui::Context, s: &mut AppState) {
    egui::SidePanel::left("sidebar")
        .resizable(true)
        .default_width(280.0)
        .show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.heading("PolyChat");
                if !s.client.is_configured() {
                    ui.colored_label(egui::Color32::YELLOW, "No API key configured");
                }

                ui.separator();
                ui.label("Groq API key");
                ui.horizontal(|ui| {
                    ui.add(
                        egui::TextEdit::singleline(&mut s.api_key_input)
                            .password(true)
                            .hint_text("gsk_..."),
                    );
                    if ui.button("Apply").clicked() {
                        s.apply_api_key();
                    }
                });

                ui.separator();
                ui.label("Model");
                let selected = registry::model_display_name(&s.session.context.model).to_string();
                egui::ComboBox::from_id_source("model_select")
                    .selected_text(selected)
                    .show_ui(ui, |ui| {
                        for model in registry::all_models() {
                            ui.selectable_value(
                                &mut s.session.context.model,
                                model.id.to_string(),
                                model.display_name,
                            );
                        }
                    });
                if let Some(model) = registry::get_model(&s.session.context.model) {
                    let mut caps = format!("{} · {}K context", model.provider, model.context_length / 1000);
                    if model.supports_vision {
                        caps.push_str(" · vision");
                    }
                    if model.is_agentic {
                        caps.push_str(" · agentic");
                    }
                    ui.small(caps);
                }

                ui.add(
                    egui::Slider::new(&mut s.session.context.temperature, 0.0..=1.0)
                        .step_by(0.1)
                        .text("Temperature"),
                );
                ui.add(
                    egui::Slider::new(&mut s.session.context.max_tokens, 256..=4096)
                        .step_by(128.0)
                        .text("Max tokens"),
                );

                ui.label("System prompt");
                ui.add(
                    egui::TextEdit::multiline(&mut s.session.context.system_prompt)
                        .desired_rows(3)
                        .desired_width(f32::INFINITY),
                );

                ui.checkbox(&mut s.session.context.enable_agentic, "Agentic tool context");
                ui.checkbox(&mut s.session.context.enable_vision, "Vision (attach images)");

                ui.separator();
                ui.label("Uploads");
                if ui.button("Upload document").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("Documents", &["txt", "json", "pdf"])
                        .pick_file()
                    {
                        s.upload_document(path);
                    }
                }
                if ui.button("Upload image").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("Images", &["png", "jpg", "jpeg", "gif", "webp", "bmp"])
                        .pick_file()
                    {
                        s.upload_image(path);
                    }
                }
                ui.horizontal(|ui| {
                    if ui.button("Transcribe audio").clicked() {
                        if let Some(path) = audio_dialog() {
                            s.upload_audio(path, false);
                        }
                    }
                    if ui.button("Translate audio").clicked() {
                        if let Some(path) = audio_dialog() {
                            s.upload_audio(path, true);
                        }
                    }
                });
                if s.pending_image.is_some() {
                    ui.small("Image attached to next message");
                }
                if !s.session.processed_files.is_empty() {
                    ui.small(format!(
                        "{} document(s) in context",
                        s.session.processed_files.len()
                    ));
                }

                ui.separator();
                ui.label("Export last reply");
                egui::ComboBox::from_id_source("generate_kind")
                    .selected_text(s.generate_kind.label())
                    .show_ui(ui, |ui| {
                        for kind in KIND_CHOICES {
                            ui.selectable_value(&mut s.generate_kind, *kind, kind.label());
                        }
                    });
                ui.add(
                    egui::TextEdit::singleline(&mut s.generate_name).hint_text("file name (optional)"),
                );
                if ui.button("Save as file").clicked() {
                    s.generate_from_last_response();
                }

                if !s.session.generated_files.is_empty() {
                    ui.separator();
                    ui.label("Downloads");
                    let mut to_open = None;
                    for artifact in &s.session.generated_files {
                        ui.horizontal(|ui| {
                            ui.label(&artifact.file_name);
                            if ui.small_button("Open").clicked() {
                                to_open = Some(artifact.path.clone());
                            }
                        });
                    }
                    if let Some(path) = to_open {
                        if let Err(e) = open::that(&path) {
                            s.status_line = Some(format!("Could not open file: {e}"));
                        }
                    }
                }

                ui.separator();
                if ui.button("Clear conversation").clicked() {
                    s.session.clear_conversation();
                }

                if let Some(status) = &s.status_line {
                    ui.separator();
                    ui.small(status.clone());
                }
            });
        });
}

fn audio_dialog() -> Option<std::path::PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Audio", &["wav", "mp3", "m4a", "ogg", "flac", "webm"])
        .pick_file()
}
