// Prompt builders for taxonomy proposal
use taxonorm_core::FieldShape;

pub const SYSTEM_PROMPT: &str = "你是一个专业的分类专家";

/// Raw values are sent comma-joined
pub fn join_raw_values(raw_values: &[String]) -> String {
    raw_values.join(",")
}

pub fn user_profile_prompt(origin_category: &str, category_type: &str) -> String {
    format!(
        "# 任务\n\
         根据下面的原始分类，按语义归纳出一组简明、具体、互不重复的典型分类。\n\
         - 使用日常生活中常用的词语，不用行业术语\n\
         - 含义相近的原始分类合并，差异明显的分别列出\n\
         - 所有原始分类都要被覆盖\n\n\
         # 原始分类\n{}\n\
         # 分类场景\n{}\n\
         # 输出格式\n\
         只输出JSON：{{\"categories\": [\"分类1\", \"分类2\"]}}\n",
        origin_category, category_type
    )
}

pub fn product_topic_prompt(origin_category: &str, category_type: &str) -> String {
    format!(
        "# 任务\n\
         作为电商评价分析专家，根据下面的原始话题，归纳出一组具体、边界清晰的商品话题分类体系。\n\
         - 保留质量、外观、功能、性价比、物流、服务等重要维度\n\
         - 高频话题可细分子类，用\"/\"分隔，例如\"物流配送/速度\"，最多两级\n\
         - 低频但有特色的话题可以保留\n\
         - 覆盖所有原始话题，分类使用中文\n\n\
         # 原始话题\n{}\n\
         # 分类场景\n电商商品{}评价分析\n\
         # 输出格式\n\
         只输出JSON：{{\"categories\": [\"分类1\", \"分类2\"]}}\n",
        origin_category, category_type
    )
}

pub fn classification_prompt(
    shape: FieldShape,
    raw_values: &[String],
    category_type: &str,
) -> String {
    let origin = join_raw_values(raw_values);
    match shape {
        FieldShape::Scalar => user_profile_prompt(&origin, category_type),
        FieldShape::List => product_topic_prompt(&origin, category_type),
    }
}
