//! Keyword-driven replies used when no remote model is configured or the
//! remote call fails. Nothing here touches the network.

use td_store::{TaskStore, completion_rate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Create,
    Search,
    Summary,
    Greeting,
    Help,
    Other,
}

/// Checked in order; the first rule with a matching keyword wins.
const INTENT_RULES: &[(Intent, &[&str])] = &[
    (Intent::Create, &["创建", "新建", "添加", "任务"]),
    (Intent::Search, &["查找", "搜索", "找"]),
    (Intent::Summary, &["总结", "统计", "报告"]),
    (Intent::Greeting, &["你好", "嗨", "早上好", "下午好", "晚上好"]),
    (Intent::Help, &["帮助", "怎么用", "功能"]),
];

const CREATE_REPLY: &str = "好的！我来帮你创建任务。请在上方输入框中输入任务标题，按回车即可快速创建。你也可以点击新建任务按钮来设置更多详细信息。📝";
const SEARCH_REPLY: &str = "我可以帮你查找任务！请使用顶部的搜索框，输入关键词来查找你需要的任务。你可以搜索任务标题或描述内容。🔍";
const HELP_REPLY: &str = "我可以帮助你：
📋 创建、编辑和管理任务
🔍 查找和搜索任务
📊 提供任务统计和总结
⭐ 设置任务优先级
📅 管理截止日期
💡 提供时间管理建议

有什么具体需要帮助的吗？";
const DEFAULT_REPLY: &str = "我理解你的需求。虽然我目前使用的是基础回复模式，但我可以帮你管理任务。你可以尝试问我关于创建任务、查找任务或获取任务总结的问题。🤝";
pub const SUMMARY_UNAVAILABLE: &str = "抱歉，无法获取任务统计数据。";

pub fn classify(message: &str) -> Intent {
    let lowered = message.to_lowercase();
    INTENT_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::Other)
}

pub fn greeting_for_hour(hour: u32) -> &'static str {
    match hour {
        0..12 => "早上好！今天有什么任务计划吗？🌟 我可以帮你创建和管理今天的任务。",
        12..18 => "下午好！需要我帮你整理任务或制定计划吗？",
        _ => "晚上好！今天完成任务了吗？我可以帮你明天的计划。",
    }
}

pub fn summary_reply(total: i64, completed: i64) -> String {
    let rate = completion_rate(completed, total);
    format!(
        "📊 **任务总结报告**\n\n• 总任务数: {total}\n• 已完成: {completed}\n• 待完成: {}\n• 完成率: {rate:.1}%\n\n继续加油！💪",
        total - completed
    )
}

#[derive(Debug, Clone)]
pub struct LocalResponder {
    store: TaskStore,
}

impl LocalResponder {
    pub fn new(store: TaskStore) -> Self {
        Self { store }
    }

    /// `hour` is the local hour of day, used only for greetings.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn reply(&self, message: &str, hour: u32) -> String {
        let intent = classify(message);
        tracing::debug!(?intent, hour, "local reply");
        match intent {
            Intent::Create => CREATE_REPLY.to_string(),
            Intent::Search => SEARCH_REPLY.to_string(),
            Intent::Summary => match self.store.counts().await {
                Ok(counts) => summary_reply(counts.total, counts.completed),
                Err(e) => {
                    tracing::warn!(error = %e, "task counts unavailable for summary");
                    SUMMARY_UNAVAILABLE.to_string()
                }
            },
            Intent::Greeting => greeting_for_hour(hour).to_string(),
            Intent::Help => HELP_REPLY.to_string(),
            Intent::Other => DEFAULT_REPLY.to_string(),
        }
    }
}
