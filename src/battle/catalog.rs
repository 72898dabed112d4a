use super::Question;

/// Static ordered question bank. Consumers index into it cyclically, so a
/// session longer than the catalog wraps back to the start.
#[derive(Debug, Clone, Default)]
pub struct QuestionCatalog {
    questions: Vec<Question>,
}

impl QuestionCatalog {
    pub fn new(questions: Vec<Question>) -> Self {
        assert!(!questions.is_empty(), "question catalog must not be empty");
        Self { questions }
    }

    pub fn question(&self, index: usize) -> &Question {
        &self.questions[index % self.questions.len()]
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn with_mock_questions() -> Self {
        Self::new(vec![
            Question::new(
                "q1",
                "下列哪项是 CAPM 模型的核心假设？",
                vec![
                    "投资者可以无风险利率借贷".into(),
                    "市场是完全竞争的".into(),
                    "所有投资者都是风险厌恶的".into(),
                    "以上都是".into(),
                ],
                3,
                "CAPM模型假设市场是完美的，投资者理性且风险厌恶。",
            ),
            Question::new(
                "q2",
                "有效前沿上的投资组合具有什么特征？",
                vec![
                    "风险最低".into(),
                    "收益最高".into(),
                    "给定风险水平下收益最高".into(),
                    "给定收益水平下风险最高".into(),
                ],
                2,
                "有效前沿代表了在特定风险水平下能获得的最高预期收益。",
            ),
            Question::new(
                "q3",
                "夏普比率（Sharpe Ratio）的计算公式是？",
                vec![
                    "(组合收益-无风险收益)/组合标准差".into(),
                    "(组合收益-无风险收益)/Beta".into(),
                    "组合收益/组合标准差".into(),
                    "无风险收益/组合标准差".into(),
                ],
                0,
                "夏普比率衡量的是每单位总风险所获得的超额收益。",
            ),
            Question::new(
                "q4",
                "下列哪项不是行为金融学中的认知偏差？",
                vec![
                    "过度自信".into(),
                    "锚定效应".into(),
                    "风险厌恶".into(),
                    "确认偏差".into(),
                ],
                2,
                "风险厌恶是传统金融学的基本假设，而非常规意义上的认知偏差。",
            ),
            Question::new(
                "q5",
                "久期（Duration）衡量的是？",
                vec![
                    "债券的到期时间".into(),
                    "债券价格对利率变化的敏感性".into(),
                    "债券的信用风险".into(),
                    "债券的票面利率".into(),
                ],
                1,
                "久期是衡量债券价格对市场利率变动敏感程度的指标。",
            ),
        ])
    }
}
