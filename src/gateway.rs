//! Assistant gateway: grounds each question in the dataset statistics and
//! forwards it to the text-generation service.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, instrument, warn};

use crate::config::GatewayConfig;
use crate::error::GenerationError;
use crate::records::StationRecord;
use crate::stats::{summarize, DatasetStats};

pub const SYSTEM_INSTRUCTION: &str = r#"Anda adalah "BOMBAbot", seorang pakar analisis data spatial yang profesional dan efisien. Tugas anda adalah menganalisis data Balai Bomba di Malaysia.

Gaya Bahasa:
- Profesional, padat, dan teknikal tetapi mudah difahami.
- Gunakan nama "BOMBAbot" atau "Saya" apabila merujuk diri sendiri.
- Gunakan format Point Form atau Jadual untuk memudahkan pengguna membaca data.

Konteks Data:
Data ini mengandungi maklumat mengenai Balai Bomba di Malaysia termasuk lokasi (Negeri), koordinat, dan statistik keanggotaan (Lelaki, Wanita, Jumlah).

Tugas Spesifik:
1. Perbandingan: Bandingkan statistik antara negeri (cth: Selangor vs Johor).
2. Pengiraan: Kira jumlah anggota, purata anggota per balai, atau peratusan balai mengikut negeri.
3. Pandangan: Berikan pandangan tentang kepadatan anggota di kawasan tertentu.
4. Cadangan Visual: Cadangkan jenis carta yang sesuai jika pengguna mahu melihat visual (cth: Carta Bar untuk perbandingan negeri).

PENTING:
- Gunakan "STATISTIK KESELURUHAN" sebagai punca kebenaran (source of truth).
- Jangan reka angka. Jika data tiada, nyatakan "Data tidak tersedia".
- Fokus kepada membantu pengguna memahami taburan spatial bomba di Malaysia."#;

/// One completion request as the service sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system_instruction: String,
    pub prompt: String,
    pub temperature: f32,
}

/// A text-completion backend. `Ok(None)` means the service answered without text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest)
        -> Result<Option<String>, GenerationError>;
}

/// Result of asking a question, before it is turned into display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskOutcome {
    Answer(String),
    /// The service replied but produced no text.
    Empty,
    RateLimited,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    pub model: String,
    pub temperature: f32,
    pub sample_size: usize,
}

impl From<&GatewayConfig> for GatewaySettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            sample_size: config.sample_size,
        }
    }
}

/// Renders the statistics block, the sample and the question.
pub fn build_prompt(stats: &DatasetStats, question: &str) -> String {
    // Serializing plain maps and structs cannot fail.
    let region_summary = serde_json::to_string(&stats.region_counts).unwrap_or_default();
    let sample = serde_json::to_string(&stats.sample).unwrap_or_else(|_| "[]".to_string());

    format!(
        "STATISTIK KESELURUHAN:\n\
         - Jumlah Besar Balai: {}\n\
         - Ringkasan Per Negeri: {}\n\
         - Total Anggota Nasional: {} (L: {}, W: {})\n\
         \n\
         SAMPEL DATA:\n\
         {}\n\
         \n\
         Pertanyaan Pengguna:\n\
         {}\n",
        stats.station_count,
        region_summary,
        stats.total_staff,
        stats.male_staff,
        stats.female_staff,
        sample,
        question
    )
}

#[derive(Clone)]
pub struct Gateway {
    generator: Arc<dyn TextGenerator>,
    settings: GatewaySettings,
}

impl Gateway {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: GatewaySettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Asks one question. Never fails: every error is folded into the outcome.
    #[instrument(skip(self, records), fields(stations = records.len(), model = %self.settings.model))]
    pub async fn ask(&self, records: &[StationRecord], question: &str) -> AskOutcome {
        let stats = summarize(records, self.settings.sample_size);
        let request = GenerationRequest {
            model: self.settings.model.clone(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            prompt: build_prompt(&stats, question),
            temperature: self.settings.temperature,
        };
        debug!(prompt = %request.prompt, "Constructed grounded prompt");

        match self.generator.generate(&request).await {
            Ok(Some(text)) if !text.trim().is_empty() => AskOutcome::Answer(text),
            Ok(_) => {
                warn!("Text-generation service returned no text");
                AskOutcome::Empty
            }
            Err(e) => {
                error!("Text-generation error: {}", e);
                if e.is_rate_limited() {
                    AskOutcome::RateLimited
                } else {
                    AskOutcome::Unavailable
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Replays canned results and records every request it sees.
    pub struct ScriptedGenerator {
        replies: Mutex<Vec<Result<Option<String>, GenerationError>>>,
        pub requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        pub fn new(replies: Vec<Result<Option<String>, GenerationError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn answering(text: &str) -> Self {
            Self::new(vec![Ok(Some(text.to_string()))])
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> Result<Option<String>, GenerationError> {
            self.requests.lock().unwrap().push(request.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(None)
            } else {
                replies.remove(0)
            }
        }
    }

    pub fn settings() -> GatewaySettings {
        GatewaySettings {
            model: "gemini-test".to_string(),
            temperature: 0.1,
            sample_size: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{settings, ScriptedGenerator};
    use super::*;
    use crate::records::parse_line;

    fn records() -> Vec<StationRecord> {
        vec![
            parse_line(r#"Selangor,1,"Balai A","Jalan 1, Klang",3.1,101.6,Balai Bomba,50,10,40"#)
                .unwrap(),
            parse_line("Kedah,1,Balai C,Jalan 3,6.1,100.3,Balai Bomba,20,2,18").unwrap(),
        ]
    }

    fn gateway(generator: Arc<ScriptedGenerator>) -> Gateway {
        Gateway::new(generator, settings())
    }

    #[test]
    fn test_prompt_layout() {
        let stats = summarize(&records(), 5);
        let prompt = build_prompt(&stats, "Berapa balai di Kedah?");

        assert!(prompt.starts_with("STATISTIK KESELURUHAN:\n- Jumlah Besar Balai: 2\n"));
        assert!(prompt.contains(r#"- Ringkasan Per Negeri: {"Kedah":1,"Selangor":1}"#));
        assert!(prompt.contains("- Total Anggota Nasional: 70 (L: 58, W: 12)"));
        assert!(prompt.contains(
            r#"SAMPEL DATA:
[{"nama":"Balai A","negeri":"Selangor","jumlah_anggota":50},{"nama":"Balai C","negeri":"Kedah","jumlah_anggota":20}]"#
        ));
        assert!(prompt.ends_with("Pertanyaan Pengguna:\nBerapa balai di Kedah?\n"));
    }

    #[test]
    fn test_prompt_for_empty_dataset() {
        let prompt = build_prompt(&summarize(&[], 5), "Ada data?");
        assert!(prompt.contains("- Jumlah Besar Balai: 0"));
        assert!(prompt.contains("- Ringkasan Per Negeri: {}"));
        assert!(prompt.contains("- Total Anggota Nasional: 0 (L: 0, W: 0)"));
        assert!(prompt.contains("SAMPEL DATA:\n[]"));
    }

    #[tokio::test]
    async fn test_ask_sends_one_grounded_request() {
        let generator = Arc::new(ScriptedGenerator::answering("**2** balai."));
        let outcome = gateway(generator.clone())
            .ask(&records(), "Berapa balai?")
            .await;

        assert_eq!(outcome, AskOutcome::Answer("**2** balai.".to_string()));
        assert_eq!(generator.calls(), 1);

        let requests = generator.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.model, "gemini-test");
        assert_eq!(request.temperature, 0.1);
        assert_eq!(request.system_instruction, SYSTEM_INSTRUCTION);
        assert!(request.system_instruction.contains("Jangan reka angka"));
        assert!(request.prompt.contains("Berapa balai?"));
    }

    #[tokio::test]
    async fn test_ask_respects_sample_size() {
        let generator = Arc::new(ScriptedGenerator::answering("ok"));
        let mut s = settings();
        s.sample_size = 1;
        Gateway::new(generator.clone(), s)
            .ask(&records(), "q")
            .await;

        let requests = generator.requests.lock().unwrap();
        assert!(requests[0].prompt.contains("Balai A"));
        assert!(!requests[0].prompt.contains("Balai C"));
    }

    #[tokio::test]
    async fn test_ask_classifies_empty_text() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(None),
            Ok(Some("  \n".to_string())),
        ]));
        let gw = gateway(generator);
        assert_eq!(gw.ask(&records(), "q").await, AskOutcome::Empty);
        assert_eq!(gw.ask(&records(), "q").await, AskOutcome::Empty);
    }

    #[tokio::test]
    async fn test_ask_classifies_rate_limit_errors() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(GenerationError::Transport("HTTP 429 Too Many Requests".to_string())),
            Err(GenerationError::Status {
                status: 429,
                body: String::new(),
            }),
        ]));
        let gw = gateway(generator);
        assert_eq!(gw.ask(&records(), "q").await, AskOutcome::RateLimited);
        assert_eq!(gw.ask(&records(), "q").await, AskOutcome::RateLimited);
    }

    #[tokio::test]
    async fn test_ask_classifies_other_errors_as_unavailable() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Err(
            GenerationError::Transport("connection reset".to_string()),
        )]));
        assert_eq!(
            gateway(generator).ask(&records(), "q").await,
            AskOutcome::Unavailable
        );
    }

    #[tokio::test]
    async fn test_ask_with_no_records_still_answers() {
        let generator = Arc::new(ScriptedGenerator::answering("Data tidak tersedia"));
        let outcome = gateway(generator.clone()).ask(&[], "Berapa balai?").await;
        assert_eq!(outcome, AskOutcome::Answer("Data tidak tersedia".to_string()));
        assert_eq!(generator.calls(), 1);
    }
}
