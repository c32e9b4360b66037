//! Keyword tables for the writeback router.
//!
//! Matching is substring-based on the lowercased message, so English entries
//! are lowercase and kept specific enough to avoid accidental hits.

/// Explicit "do not touch the document" instructions. Always win.
pub const NEGATIVE_PHRASES: &[&str] = &[
    "不要写入",
    "不用写入",
    "别写入",
    "不要写回",
    "不用写回",
    "别写回",
    "不要插入",
    "别插入",
    "不要修改文档",
    "别改文档",
    "不要动文档",
    "不要改文档",
    "只回答",
    "只需回答",
    "直接回答",
    "仅回答",
    "口头回答",
    "don't write",
    "do not write",
    "dont write",
    "don't insert",
    "do not insert",
    "don't modify",
    "do not modify",
    "no writeback",
    "without writing",
    "just answer",
    "only answer",
    "answer only",
];

/// Verbs that on their own signal a document mutation.
pub const STRONG_VERBS: &[&str] = &[
    "写入",
    "写到",
    "写进",
    "写在",
    "插入",
    "替换",
    "追加",
    "填入",
    "填写",
    "改写",
    "重写",
    "润色",
    "修改",
    "删除",
    "删掉",
    "排版",
    "格式化",
    "应用到",
    "生成到",
    "放到",
    "放入",
    "加到",
    "添加到",
    "更新到",
    "insert",
    "write into",
    "write to",
    "replace",
    "append",
    "rewrite",
    "apply to",
    "fill in",
    "delete the",
];

/// Generation verbs that only count together with a chart noun.
pub const SOFT_VERBS: &[&str] = &[
    "生成", "画", "绘制", "做", "创建", "输出", "制作", "来个", "弄", "generate", "draw", "create",
    "make", "plot", "build",
];

/// Things in a document a write can target.
pub const TARGET_NOUNS: &[&str] = &[
    "文档",
    "文中",
    "正文",
    "文章",
    "段落",
    "这段",
    "本段",
    "光标",
    "选区",
    "选中",
    "表格",
    "单元格",
    "工作表",
    "幻灯片",
    "演示",
    "页面",
    "末尾",
    "文末",
    "结尾",
    "标题",
    "document",
    "paragraph",
    "cursor",
    "selection",
    "table",
    "cell",
    "worksheet",
    "sheet",
    "slide",
];

pub const CHART_NOUNS: &[&str] = &[
    "图表",
    "柱形图",
    "柱状图",
    "条形图",
    "折线图",
    "饼图",
    "散点图",
    "面积图",
    "雷达图",
    "chart",
    "graph",
    "histogram",
];

/// Markers of an explanatory, how or why question.
pub const QUESTION_MARKERS: &[&str] = &[
    "什么意思",
    "啥意思",
    "是什么",
    "什么是",
    "为什么",
    "为何",
    "怎么理解",
    "如何理解",
    "怎么",
    "如何",
    "解释",
    "含义",
    "区别",
    "请问",
    "what is",
    "what does",
    "what's",
    "why",
    "how do",
    "how to",
    "explain",
    "meaning",
    "difference between",
];

/// Acknowledgements compared against the compacted message.
pub const ACKNOWLEDGEMENTS: &[&str] = &[
    "你好",
    "您好",
    "hi",
    "hello",
    "hey",
    "ok",
    "okay",
    "好",
    "好的",
    "好滴",
    "嗯",
    "嗯嗯",
    "谢谢",
    "多谢",
    "感谢",
    "thanks",
    "thankyou",
    "thx",
    "收到",
    "明白",
    "知道了",
    "了解",
    "不错",
    "很好",
    "辛苦了",
    "哈哈",
    "👍",
];

/// Short replies that continue the previous turn.
pub const CONTINUATIONS: &[&str] = &[
    "继续",
    "确认",
    "确定",
    "执行",
    "开始",
    "是的",
    "可以",
    "没问题",
    "continue",
    "goon",
    "go",
    "proceed",
    "confirm",
    "yes",
];

/// Particles allowed around a continuation word ("请继续吧").
pub const CONTINUATION_PARTICLES: &[&str] = &["请", "吧", "啊", "呀", "哈", "了", "please"];

/// Prior-context substrings showing a plan was already in play.
pub const PLAN_MARKERS: &[&str] = &["schema_version", "upsert_block", "ah32.plan"];

/// Fence info strings of JS macro blocks.
pub const MACRO_FENCE_LANGS: &[&str] = &["js", "javascript"];

pub const CURSOR_KEYWORDS: &[&str] = &[
    "光标",
    "当前位置",
    "此处",
    "这里",
    "选区",
    "选中",
    "cursor",
    "current position",
    "right here",
];

pub const END_KEYWORDS: &[&str] = &[
    "末尾",
    "文末",
    "结尾",
    "最后",
    "追加",
    "at the end",
    "to the end",
    "append",
    "bottom",
];
