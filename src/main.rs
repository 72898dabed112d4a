mod battle;
mod friends;
mod tutor;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use battle::catalog::QuestionCatalog;
use battle::{
    Advance, BattleSession, Outcome, Phase, FINAL_OPPONENT_SCORE, QUESTIONS_PER_BATTLE,
    QUESTION_SECONDS,
};
use dotenv::dotenv;
use friends::{FriendDirectory, User};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{ChatAction, ChatId, KeyboardButton, KeyboardMarkup},
};
use tutor::generator::{ChatGptGenerator, TextGenerator};
use tutor::TutorChat;

type BotDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    ReceiveMenuChoice,
    ReceiveOpponentChoice,
    Battle {
        session: BattleSession,
        asked_at: u64,
    },
    TutorChat,
}

type StateStorage = std::sync::Arc<ErasedStorage<State>>;

/// Live tutor sessions keyed by chat. These hold a generator handle and so
/// cannot ride along in the serialized dialogue state; a session lives from
/// entering the tutor page until the user leaves it.
#[derive(Default)]
struct TutorRegistry {
    sessions: Mutex<HashMap<ChatId, Arc<TutorChat>>>,
}

impl TutorRegistry {
    fn start(
        &self,
        chat: ChatId,
        generator: Arc<dyn TextGenerator>,
        student: User,
    ) -> Arc<TutorChat> {
        let session = Arc::new(TutorChat::new(generator, student));
        self.sessions.lock().unwrap().insert(chat, session.clone());
        session
    }

    fn session(
        &self,
        chat: ChatId,
        generator: &Arc<dyn TextGenerator>,
        student: &User,
    ) -> Arc<TutorChat> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .entry(chat)
            .or_insert_with(|| Arc::new(TutorChat::new(generator.clone(), student.clone())))
            .clone()
    }

    fn discard(&self, chat: ChatId) {
        self.sessions.lock().unwrap().remove(&chat);
    }
}

#[tokio::main]
async fn main() {
    dotenv().expect("Failed to load .env file");
    let chatgpt_api_key = std::env::var("CHATGPT_API_KEY").expect("CHATGPT_API_KEY is not set");

    pretty_env_logger::init();
    log::info!("Starting exam battle bot...");

    let bot = Bot::from_env();

    let storage: StateStorage = SqliteStorage::open("db.sqlite", Json)
        .await
        .unwrap()
        .erase();

    let catalog = Arc::new(QuestionCatalog::with_mock_questions());
    let directory = Arc::new(Mutex::new(FriendDirectory::with_mock_friends()));
    let me = Arc::new(friends::mock_me());

    let generator: Arc<dyn TextGenerator> =
        Arc::new(ChatGptGenerator::new(&chatgpt_api_key).expect("Unable to connect with ChatGPT"));
    let tutors = Arc::new(TutorRegistry::default());

    let directory_for_menu = directory.clone();
    let me_for_menu = me.clone();
    let tutors_for_menu = tutors.clone();
    let generator_for_menu = generator.clone();
    let tutors_for_chat = tutors.clone();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveMenuChoice].endpoint(
                move |bot: Bot, dialogue: BotDialogue, msg: Message| {
                    receive_menu_choice(
                        directory_for_menu.clone(),
                        me_for_menu.clone(),
                        tutors_for_menu.clone(),
                        generator_for_menu.clone(),
                        bot,
                        dialogue,
                        msg,
                    )
                },
            ))
            .branch(dptree::case![State::ReceiveOpponentChoice].endpoint(
                move |bot: Bot, dialogue: BotDialogue, msg: Message| {
                    receive_opponent_choice(directory.clone(), catalog.clone(), bot, dialogue, msg)
                },
            ))
            .branch(dptree::case![State::Battle { session, asked_at }].endpoint(battle_turn))
            .branch(dptree::case![State::TutorChat].endpoint(
                move |bot: Bot, dialogue: BotDialogue, msg: Message| {
                    tutor_chat(
                        tutors_for_chat.clone(),
                        generator.clone(),
                        me.clone(),
                        bot,
                        dialogue,
                        msg,
                    )
                },
            )),
    )
    .dependencies(dptree::deps![storage])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const BATTLE_BUTTON: &str = "1v1 巅峰对战";
const TUTOR_BUTTON: &str = "AI 答疑";
const FRIENDS_BUTTON: &str = "好友";
const PROFILE_BUTTON: &str = "我的";
const CONTINUE_BUTTON: &str = "继续";
const BACK_BUTTON: &str = "返回菜单";
const MOCK_TEST_BUTTON: &str = "生成小测验";
const FEEDBACK_BUTTON: &str = "学习反馈";
const REMOVE_FRIEND_PREFIX: &str = "删除 ";

const SUGGESTED_QUESTIONS: [&str; 4] = [
    "什么是 CAPM 模型？",
    "如何理解有效前沿？",
    "夏普比率的意义是什么？",
    "久期和利率的关系？",
];

const GREETING_TEXT: &str = "欢迎来到金蝉刷题！和好友对战刷题，或者让 AI 助教帮你答疑。";

fn menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(BATTLE_BUTTON),
            KeyboardButton::new(TUTOR_BUTTON),
        ],
        vec![
            KeyboardButton::new(FRIENDS_BUTTON),
            KeyboardButton::new(PROFILE_BUTTON),
        ],
    ])
}

fn tutor_keyboard() -> KeyboardMarkup {
    let mut rows = vec![vec![
        KeyboardButton::new(MOCK_TEST_BUTTON),
        KeyboardButton::new(FEEDBACK_BUTTON),
    ]];
    for suggestion in SUGGESTED_QUESTIONS {
        rows.push(vec![KeyboardButton::new(suggestion)]);
    }
    rows.push(vec![KeyboardButton::new(BACK_BUTTON)]);
    KeyboardMarkup::new(rows)
}

fn continue_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(CONTINUE_BUTTON)]])
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

async fn start(bot: Bot, dialogue: BotDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT)
        .reply_markup(menu_keyboard())
        .await?;

    dialogue.update(State::ReceiveMenuChoice).await?;
    Ok(())
}

async fn receive_menu_choice(
    directory: Arc<Mutex<FriendDirectory>>,
    me: Arc<User>,
    tutors: Arc<TutorRegistry>,
    generator: Arc<dyn TextGenerator>,
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(BATTLE_BUTTON) => {
            let friends: Vec<String> = {
                let directory = directory.lock().unwrap();
                directory.list().iter().map(|f| f.name.clone()).collect()
            };
            if friends.is_empty() {
                bot.send_message(msg.chat.id, "还没有好友哦，没法开战！")
                    .reply_markup(menu_keyboard())
                    .await?;
                return Ok(());
            }

            let keyboard = KeyboardMarkup::new(
                friends
                    .iter()
                    .map(|name| vec![KeyboardButton::new(name.clone())])
                    .collect::<Vec<_>>(),
            );
            bot.send_message(msg.chat.id, "想挑战哪位好友？")
                .reply_markup(keyboard)
                .await?;
            dialogue.update(State::ReceiveOpponentChoice).await?;
            Ok(())
        }
        Some(TUTOR_BUTTON) => {
            tutors.start(msg.chat.id, generator, (*me).clone());
            bot.send_message(msg.chat.id, tutor::GREETING)
                .reply_markup(tutor_keyboard())
                .await?;
            dialogue.update(State::TutorChat).await?;
            Ok(())
        }
        Some(FRIENDS_BUTTON) => {
            let listing = {
                let directory = directory.lock().unwrap();
                if directory.list().is_empty() {
                    "还没有好友哦，快去搜索添加吧！".to_string()
                } else {
                    let lines: Vec<String> = directory
                        .list()
                        .iter()
                        .map(|f| {
                            format!(
                                "{}（{}）Lv.{}  {}  [ID: {}]",
                                f.name,
                                f.exam_track.label(),
                                f.level,
                                f.presence_label(),
                                f.id,
                            )
                        })
                        .collect();
                    format!(
                        "我的好友：\n{}\n\n发送「删除 <ID>」可以移除好友",
                        lines.join("\n")
                    )
                }
            };
            bot.send_message(msg.chat.id, listing)
                .reply_markup(menu_keyboard())
                .await?;
            Ok(())
        }
        Some(PROFILE_BUTTON) => {
            let profile = format!(
                "{}\n{} 一级备考者\n\n等级：{}\n总 XP：{}\n连续打卡：{} 天\n今日学习：{} 分钟",
                me.name,
                me.exam_track.label(),
                me.level,
                me.xp,
                me.streak,
                me.study_minutes,
            );
            bot.send_message(msg.chat.id, profile)
                .reply_markup(menu_keyboard())
                .await?;
            Ok(())
        }
        Some(text) if text.starts_with(REMOVE_FRIEND_PREFIX) => {
            let id = text[REMOVE_FRIEND_PREFIX.len()..].trim();
            let removed = directory.lock().unwrap().remove(id);
            let reply = if removed {
                "已移除该好友"
            } else {
                "没有找到这个 ID 的好友"
            };
            bot.send_message(msg.chat.id, reply)
                .reply_markup(menu_keyboard())
                .await?;
            Ok(())
        }
        _ => {
            bot.send_message(msg.chat.id, "请选择一个选项")
                .reply_markup(menu_keyboard())
                .await?;
            Ok(())
        }
    }
}

async fn receive_opponent_choice(
    directory: Arc<Mutex<FriendDirectory>>,
    catalog: Arc<QuestionCatalog>,
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
) -> HandlerResult {
    let opponent = msg
        .text()
        .and_then(|name| directory.lock().unwrap().find_by_name(name).cloned());

    let Some(opponent) = opponent else {
        bot.send_message(msg.chat.id, "请从列表中选择一位好友")
            .await?;
        return Ok(());
    };

    log::info!("Starting battle against {}", opponent.name);
    let session = BattleSession::new(opponent, &catalog);

    bot.send_message(
        msg.chat.id,
        format!(
            "对战开始！你 vs {}，共 {} 题，答得越快得分越高！",
            session.opponent.name, QUESTIONS_PER_BATTLE
        ),
    )
    .await?;
    send_question(&bot, msg.chat.id, &session).await?;

    dialogue
        .update(State::Battle {
            session,
            asked_at: now_secs(),
        })
        .await?;
    Ok(())
}

async fn send_question(bot: &Bot, chat_id: ChatId, session: &BattleSession) -> HandlerResult {
    let question = session.current_question();
    let text = format!(
        "第 {}/{} 题（限时 {} 秒）\n\n{}",
        session.question_number(),
        QUESTIONS_PER_BATTLE,
        QUESTION_SECONDS,
        question.text,
    );

    let keyboard = KeyboardMarkup::new(
        question
            .options
            .iter()
            .map(|option| vec![KeyboardButton::new(option.clone())])
            .collect::<Vec<_>>(),
    );

    bot.send_message(chat_id, text)
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

fn answer_feedback(session: &BattleSession) -> String {
    let question = session.current_question();
    let verdict = match session.phase() {
        Phase::Answered { selected: None, .. } => "时间到！本题未作答".to_string(),
        Phase::Answered { correct: true, .. } => "太棒了！".to_string(),
        Phase::Answered { correct: false, .. } => format!(
            "哎呀，答错了。正确答案是：{}",
            question.options[question.correct_index]
        ),
        _ => String::new(),
    };

    format!(
        "{}\n\n解析：{}\n\n当前比分  你 {} : {} {}",
        verdict,
        question.explanation,
        session.score(),
        battle::opponent_display_score(session.question_number()),
        session.opponent.name,
    )
}

async fn battle_turn(
    bot: Bot,
    dialogue: BotDialogue,
    (mut session, asked_at): (BattleSession, u64),
    msg: Message,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "请用下方按钮作答").await?;
        return Ok(());
    };

    // Map the wall-clock gap since the question was asked onto countdown
    // ticks. A no-op once the question is already resolved.
    let was_answered = session.is_answered();
    session.elapse(now_secs().saturating_sub(asked_at));

    if !was_answered {
        if session.is_answered() {
            // The countdown ran out while the user was idle; their late
            // input is discarded and the question counts as unanswered.
            bot.send_message(msg.chat.id, answer_feedback(&session))
                .reply_markup(continue_keyboard())
                .await?;
            dialogue
                .update(State::Battle {
                    session,
                    asked_at: now_secs(),
                })
                .await?;
            return Ok(());
        }

        let selected = session
            .current_question()
            .options
            .iter()
            .position(|option| option == text);

        let Some(index) = selected else {
            bot.send_message(msg.chat.id, "请点击选项作答").await?;
            dialogue
                .update(State::Battle {
                    session,
                    asked_at: now_secs(),
                })
                .await?;
            return Ok(());
        };

        session.submit_answer(index);
        log::debug!(
            "question {} answered, score is now {}",
            session.question_number(),
            session.score()
        );

        bot.send_message(msg.chat.id, answer_feedback(&session))
            .reply_markup(continue_keyboard())
            .await?;
        dialogue
            .update(State::Battle {
                session,
                asked_at: now_secs(),
            })
            .await?;
        return Ok(());
    }

    // Question already answered: only 「继续」 moves the session forward.
    if text != CONTINUE_BUTTON {
        bot.send_message(msg.chat.id, "点击「继续」进入下一题")
            .reply_markup(continue_keyboard())
            .await?;
        return Ok(());
    }

    match session.acknowledge() {
        Some(Advance::NextQuestion) => {
            send_question(&bot, msg.chat.id, &session).await?;
            dialogue
                .update(State::Battle {
                    session,
                    asked_at: now_secs(),
                })
                .await?;
        }
        Some(Advance::Finished(score)) => {
            log::info!("Battle finished with score {}", score);
            let outcome = Outcome::of_score(score);
            let headline = match outcome {
                Outcome::Win => "你赢了！",
                Outcome::Loss => "再接再厉",
            };
            let result = format!(
                "{}\n\n最终比分 {} : {}\n经验值 +{}\n连胜 +1\n\n想做点什么？",
                headline,
                score,
                FINAL_OPPONENT_SCORE,
                outcome.xp_reward(),
            );
            bot.send_message(msg.chat.id, result)
                .reply_markup(menu_keyboard())
                .await?;
            dialogue.update(State::ReceiveMenuChoice).await?;
        }
        None => {}
    }
    Ok(())
}

async fn tutor_chat(
    tutors: Arc<TutorRegistry>,
    generator: Arc<dyn TextGenerator>,
    me: Arc<User>,
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
) -> HandlerResult {
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "请发送文字消息").await?;
        return Ok(());
    };

    if text == BACK_BUTTON {
        tutors.discard(msg.chat.id);
        bot.send_message(msg.chat.id, "已返回主菜单")
            .reply_markup(menu_keyboard())
            .await?;
        dialogue.update(State::ReceiveMenuChoice).await?;
        return Ok(());
    }

    let session = tutors.session(msg.chat.id, &generator, &me);

    // It adds to the experience even if the action fails, so the result
    // is ignored on purpose.
    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;

    let reply = match text {
        MOCK_TEST_BUTTON => session.generate_mock_test().await,
        FEEDBACK_BUTTON => session.request_feedback().await,
        question => session.send_message(question).await,
    };

    match reply {
        Some(message) => {
            let body = if message.is_generated_test {
                format!("📝 专属小测验\n\n{}", message.text)
            } else {
                message.text
            };
            bot.send_message(msg.chat.id, body)
                .reply_markup(tutor_keyboard())
                .await?;
        }
        None if session.is_busy() => {
            bot.send_message(msg.chat.id, "助教正在思考上一条问题，请稍等～")
                .await?;
        }
        None => {}
    }
    Ok(())
}
