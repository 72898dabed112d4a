/// Which exam a user is grinding for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExamTrack {
    Cfa,
    Cpa,
    Frm,
}

impl ExamTrack {
    pub fn label(&self) -> &'static str {
        match self {
            ExamTrack::Cfa => "CFA",
            ExamTrack::Cpa => "CPA",
            ExamTrack::Frm => "FRM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Presence {
    Online,
    Offline,
    Studying,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub exam_track: ExamTrack,
    pub level: u32,
    pub xp: u32,
    pub streak: u32,
    pub study_minutes: u32,
    pub presence: Presence,
    pub last_active: Option<String>,
}

impl User {
    /// Presence line as shown in the friend list.
    pub fn presence_label(&self) -> String {
        match self.presence {
            Presence::Studying => "刷题中...".to_string(),
            Presence::Online => "在线".to_string(),
            Presence::Offline => match &self.last_active {
                Some(when) => format!("{}活跃", when),
                None => "离线".to_string(),
            },
        }
    }
}

/// Read-only roster of friends, plus removal. Presence is reference data
/// maintained elsewhere; nothing here computes it.
#[derive(Debug, Clone, Default)]
pub struct FriendDirectory {
    friends: Vec<User>,
}

impl FriendDirectory {
    pub fn new(friends: Vec<User>) -> Self {
        Self { friends }
    }

    pub fn get(&self, id: &str) -> Option<&User> {
        self.friends.iter().find(|f| f.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&User> {
        self.friends.iter().find(|f| f.name == name)
    }

    pub fn list(&self) -> &[User] {
        &self.friends
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.friends.len();
        self.friends.retain(|f| f.id != id);
        self.friends.len() < before
    }

    pub fn with_mock_friends() -> Self {
        Self::new(vec![
            User {
                id: "1".into(),
                name: "王小明".into(),
                avatar: "https://api.dicebear.com/7.x/avataaars/svg?seed=John".into(),
                exam_track: ExamTrack::Cfa,
                level: 15,
                xp: 3200,
                streak: 12,
                study_minutes: 300,
                presence: Presence::Studying,
                last_active: None,
            },
            User {
                id: "2".into(),
                name: "李华".into(),
                avatar: "https://api.dicebear.com/7.x/avataaars/svg?seed=Sarah".into(),
                exam_track: ExamTrack::Cpa,
                level: 10,
                xp: 1800,
                streak: 3,
                study_minutes: 180,
                presence: Presence::Offline,
                last_active: Some("2小时前".into()),
            },
            User {
                id: "3".into(),
                name: "张金融".into(),
                avatar: "https://api.dicebear.com/7.x/avataaars/svg?seed=Mike".into(),
                exam_track: ExamTrack::Frm,
                level: 8,
                xp: 1200,
                streak: 5,
                study_minutes: 0,
                presence: Presence::Online,
                last_active: None,
            },
        ])
    }
}

pub fn mock_me() -> User {
    User {
        id: "me".into(),
        name: "金蝉学霸".into(),
        avatar: "https://api.dicebear.com/7.x/avataaars/svg?seed=Felix".into(),
        exam_track: ExamTrack::Cfa,
        level: 12,
        xp: 2450,
        streak: 7,
        study_minutes: 120,
        presence: Presence::Online,
        last_active: None,
    }
}
