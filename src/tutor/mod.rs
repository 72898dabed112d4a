pub mod generator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::friends::User;
use generator::TextGenerator;

pub const GREETING: &str = "你好！我是你的金蝉助教。有什么金融备考难题需要我帮你解答吗？";
pub const FALLBACK_REPLY: &str = "抱歉，助教暂时开小差了，请稍后再试一次。";

const MOCK_TEST_PROMPT: &str = "请给我出一套小测验练练手！";
const FEEDBACK_PROMPT: &str = "请根据我的学习情况给我一些反馈和建议。";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub is_generated_test: bool,
}

impl ChatMessage {
    fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            is_generated_test: false,
        }
    }

    fn assistant(text: impl Into<String>, is_generated_test: bool) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            is_generated_test,
        }
    }
}

/// One tutor chat: an append-only transcript plus a single-flight guard so
/// at most one generation request is outstanding at a time. Invalid
/// operations (empty input, sending while busy) are silently ignored and
/// leave the transcript untouched; generation failures collapse to a fixed
/// fallback reply and are never re-raised.
pub struct TutorChat {
    generator: Arc<dyn TextGenerator>,
    student: User,
    transcript: Mutex<Vec<ChatMessage>>,
    in_flight: AtomicBool,
}

impl TutorChat {
    pub fn new(generator: Arc<dyn TextGenerator>, student: User) -> Self {
        Self {
            generator,
            student,
            transcript: Mutex::new(vec![ChatMessage::assistant(GREETING, false)]),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.transcript.lock().unwrap().clone()
    }

    /// True while a generation request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Free-text question to the tutor. Returns the assistant reply that
    /// was appended, or `None` if the message was rejected.
    pub async fn send_message(&self, text: &str) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.dispatch(text.to_string(), self.persona_instruction(), false)
            .await
    }

    /// Asks the tutor to author a short multiple-choice quiz. The reply is
    /// flagged so the caller can render it distinctly.
    pub async fn generate_mock_test(&self) -> Option<ChatMessage> {
        self.dispatch(
            MOCK_TEST_PROMPT.to_string(),
            self.mock_test_instruction(),
            true,
        )
        .await
    }

    /// Asks for personalized progress feedback.
    pub async fn request_feedback(&self) -> Option<ChatMessage> {
        self.dispatch(FEEDBACK_PROMPT.to_string(), self.feedback_instruction(), false)
            .await
    }

    async fn dispatch(
        &self,
        user_text: String,
        system_instruction: String,
        is_generated_test: bool,
    ) -> Option<ChatMessage> {
        // Single-flight: the guard stays held across the await, so a
        // second request can only start after this one resolves.
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        self.push(ChatMessage::user(&user_text));

        let reply = match self
            .generator
            .generate(&user_text, &system_instruction)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => FALLBACK_REPLY.to_string(),
            Err(e) => {
                log::warn!("tutor generation failed: {}", e);
                FALLBACK_REPLY.to_string()
            }
        };

        let message = ChatMessage::assistant(reply, is_generated_test);
        self.push(message.clone());

        self.in_flight.store(false, Ordering::SeqCst);
        Some(message)
    }

    fn push(&self, message: ChatMessage) {
        self.transcript.lock().unwrap().push(message);
    }

    fn persona_instruction(&self) -> String {
        format!(
            "你是「金蝉助教」，一位亲切耐心的金融备考辅导老师。\
            学员正在备考{}，当前等级 {}，经验值 {}。\
            请结合学员的水平，用简洁易懂的中文解答金融备考问题。",
            self.student.exam_track.label(),
            self.student.level,
            self.student.xp,
        )
    }

    fn mock_test_instruction(&self) -> String {
        format!(
            "你是「金蝉助教」。请为备考{}的学员（等级 {}）出 3 道单项选择题，\
            每题附 A/B/C/D 四个选项，并在最后给出答案与简要解析。",
            self.student.exam_track.label(),
            self.student.level,
        )
    }

    fn feedback_instruction(&self) -> String {
        format!(
            "你是「金蝉助教」。学员正在备考{}，当前等级 {}，经验值 {}，连续学习 {} 天。\
            请给出一段个性化的学习进度反馈和下一步备考建议。",
            self.student.exam_track.label(),
            self.student.level,
            self.student.xp,
            self.student.streak,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::generator::GenerateError;
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    struct ScriptedGenerator {
        reply: Result<String, ()>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _system_instruction: &str,
        ) -> Result<String, GenerateError> {
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(GenerateError::Backend("connection reset".into())),
            }
        }
    }

    /// Blocks inside `generate` until released, to expose the in-flight
    /// window to tests.
    struct GatedGenerator {
        gate: Notify,
    }

    #[async_trait]
    impl TextGenerator for GatedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _system_instruction: &str,
        ) -> Result<String, GenerateError> {
            self.gate.notified().await;
            Ok("slow reply".to_string())
        }
    }

    fn chat_with_reply(reply: Result<String, ()>) -> TutorChat {
        TutorChat::new(
            Arc::new(ScriptedGenerator { reply }),
            crate::friends::mock_me(),
        )
    }

    #[tokio::test]
    async fn transcript_starts_with_greeting() {
        let chat = chat_with_reply(Ok("hi".into()));
        let transcript = chat.transcript();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].role, Role::Assistant);
        assert_eq!(transcript[0].text, GREETING);
    }

    #[tokio::test]
    async fn send_message_appends_user_then_assistant() {
        let chat = chat_with_reply(Ok("久期衡量利率敏感性。".into()));

        let reply = chat.send_message("什么是久期？").await.unwrap();
        assert_eq!(reply.text, "久期衡量利率敏感性。");

        let transcript = chat.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1].role, Role::User);
        assert_eq!(transcript[1].text, "什么是久期？");
        assert_eq!(transcript[2].role, Role::Assistant);
        assert!(!transcript[2].is_generated_test);
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn empty_and_whitespace_input_is_rejected() {
        let chat = chat_with_reply(Ok("hi".into()));
        assert!(chat.send_message("").await.is_none());
        assert!(chat.send_message("   \n\t").await.is_none());
        assert_eq!(chat.transcript().len(), 1);
    }

    #[tokio::test]
    async fn generation_failure_appends_fallback() {
        let chat = chat_with_reply(Err(()));

        let reply = chat.send_message("什么是 CAPM？").await.unwrap();
        assert_eq!(reply.text, FALLBACK_REPLY);

        let transcript = chat.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[2].text, FALLBACK_REPLY);
        assert!(!chat.is_busy());
    }

    #[tokio::test]
    async fn blank_completion_appends_fallback() {
        let chat = chat_with_reply(Ok("   ".into()));
        let reply = chat.send_message("讲讲夏普比率").await.unwrap();
        assert_eq!(reply.text, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn mock_test_reply_is_flagged() {
        let chat = chat_with_reply(Ok("第1题……".into()));

        let reply = chat.generate_mock_test().await.unwrap();
        assert!(reply.is_generated_test);

        let transcript = chat.transcript();
        assert_eq!(transcript[1].role, Role::User);
        assert!(!transcript[1].is_generated_test);
        assert!(transcript[2].is_generated_test);
    }

    #[tokio::test]
    async fn feedback_reply_is_not_flagged() {
        let chat = chat_with_reply(Ok("继续保持！".into()));
        let reply = chat.request_feedback().await.unwrap();
        assert!(!reply.is_generated_test);
        assert_eq!(chat.transcript().len(), 3);
    }

    #[tokio::test]
    async fn second_send_while_in_flight_is_rejected() {
        let generator = Arc::new(GatedGenerator {
            gate: Notify::new(),
        });
        let chat = Arc::new(TutorChat::new(
            generator.clone(),
            crate::friends::mock_me(),
        ));

        let first = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.send_message("第一个问题").await })
        };

        while !chat.is_busy() {
            tokio::task::yield_now().await;
        }

        // Rejected outright: nothing appended, no second request started.
        assert!(chat.send_message("第二个问题").await.is_none());

        generator.gate.notify_one();
        let reply = first.await.unwrap().unwrap();
        assert_eq!(reply.text, "slow reply");

        let transcript = chat.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1].text, "第一个问题");
        assert_eq!(transcript[2].text, "slow reply");
        assert!(!chat.is_busy());
    }
}
