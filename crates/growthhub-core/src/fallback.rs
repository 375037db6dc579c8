//! Canned responses and error classification.
//!
//! Both are substring lookups over fixed tables. Call sites only see
//! [`FallbackLookup`] and [`classify_error`], so the matching strategy can
//! change without touching them.

use serde::Serialize;

/// Appended to canned text served after a generator failure.
pub const FALLBACK_NOTICE: &str =
    "※実際のAI応答でエラーが発生したため、サンプル応答を表示しています。";

/// Appended to canned text served when a request is sampled out.
pub const SAMPLE_NOTICE: &str = "※コスト削減のため、サンプル応答を表示しています。";

/// Substrings identifying text that is a degraded answer rather than a real
/// generation. Such text is never billed.
pub const FALLBACK_MARKERS: &[&str] = &[
    "※実際のAI応答でエラーが発生したため",
    "※コスト削減のため",
];

pub fn is_fallback_text(text: &str) -> bool {
    FALLBACK_MARKERS.iter().any(|marker| text.contains(marker))
}

pub fn with_notice(response: &str, notice: &str) -> String {
    format!("{response}\n\n{notice}")
}

/// Prompt → canned answer.
pub trait FallbackLookup: Send + Sync + 'static {
    fn lookup(&self, prompt: &str) -> Option<&str>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedResponse {
    pub triggers: &'static [&'static str],
    pub response: &'static str,
}

/// Ordered table; the first entry with a trigger contained in the prompt wins.
#[derive(Debug, Clone)]
pub struct CannedResponses {
    entries: Vec<CannedResponse>,
}

impl CannedResponses {
    pub fn new(entries: Vec<CannedResponse>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CannedResponse] {
        &self.entries
    }
}

impl FallbackLookup for CannedResponses {
    fn lookup(&self, prompt: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.triggers.iter().any(|t| prompt.contains(t)))
            .map(|entry| entry.response)
    }
}

impl Default for CannedResponses {
    fn default() -> Self {
        Self::new(vec![
            CannedResponse {
                triggers: &["休眠顧客再活性メール"],
                response: "この施策は90日間購入がない顧客に対して、特別なクーポンやオファーを提供することで再購入を促進するものです。期待効果として、休眠顧客の20-30%が再購入に至り、平均注文額も通常より15%程度高い傾向があります。実行時の注意点として、過度な割引は利益率を下げるため、付加価値のあるオファーを検討することをお勧めします。",
            },
            CannedResponse {
                triggers: &["SMS フラッシュセール"],
                response: "SMSを活用した期間限定セールは、緊急性を演出することで即座の購買行動を促す効果的な施策です。特に週末限定の20%OFFは、顧客の購買意欲を高め、売上向上に直結します。注意点として、SMS配信の頻度は月1-2回程度に抑え、顧客の反応率を監視することが重要です。",
            },
            CannedResponse {
                triggers: &["チェックアウト UI A/B テスト"],
                response: "チェックアウトフローの最適化は、コンバージョン率向上に最も効果的な施策の一つです。簡易チェックアウトと現行フローを比較することで、ユーザビリティの改善点を特定できます。期待効果として、CVRが5-15%向上する可能性があります。テスト期間は最低2週間、統計的有意性を確保してから判断することをお勧めします。",
            },
            CannedResponse {
                triggers: &["返品", "返金"],
                response: "商品の返品は、商品到着後7日以内で、未使用・未開封の場合に限り承っております。返品をご希望の場合は、注文番号をお教えください。返品手続きの詳細をお送りいたします。",
            },
            CannedResponse {
                triggers: &["配送", "発送", "配達"],
                response: "通常の配送は3-5営業日でお届けします。お急ぎの場合は、有料の速達配送サービスもご利用いただけます。配送状況の詳細は、注文確認メールに記載されている追跡番号でご確認ください。",
            },
            CannedResponse {
                triggers: &["支払い", "決済", "お金"],
                response: "クレジットカード、銀行振込、代金引換、各種電子マネーをご利用いただけます。セキュリティのため、お客様の個人情報は暗号化して安全に管理しております。",
            },
            CannedResponse {
                triggers: &["こんにちは", "挨拶"],
                response: "こんにちは！EC Growth HubのAIアシスタントです。ご質問やお困りのことがございましたら、お気軽にお声かけください。",
            },
        ])
    }
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ApiLimit,
    NetworkError,
    AiError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryAction {
    pub label: &'static str,
    pub description: &'static str,
    pub action: &'static str,
}

const ERROR_RULES: &[(&[&str], ErrorKind)] = &[
    (&["制限", "limit"], ErrorKind::ApiLimit),
    (&["ネットワーク", "network"], ErrorKind::NetworkError),
];

/// Classify a human-readable error message for display purposes.
pub fn classify_error(message: &str) -> ErrorKind {
    ERROR_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| message.contains(n)))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::AiError)
}

const SHOW_SAMPLE: RecoveryAction = RecoveryAction {
    label: "サンプルレポートを見る",
    description: "事前に用意された分析レポートを表示します",
    action: "show_sample",
};

const RETRY: RecoveryAction = RecoveryAction {
    label: "再試行",
    description: "再度AI解析を実行します",
    action: "retry",
};

impl ErrorKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::ApiLimit => "API利用制限に達しました",
            Self::NetworkError => "ネットワークエラーが発生しました",
            Self::AiError => "AI解析に失敗しました",
        }
    }

    pub fn actions(&self) -> Vec<RecoveryAction> {
        match self {
            Self::ApiLimit => vec![
                RecoveryAction {
                    label: "プランをアップグレード",
                    description: "より多くのAPI呼び出しが可能になります",
                    action: "upgrade_plan",
                },
                RecoveryAction {
                    label: "利用制限を確認",
                    description: "現在の利用状況を確認します",
                    action: "check_usage",
                },
                SHOW_SAMPLE,
            ],
            Self::NetworkError => vec![
                RETRY,
                SHOW_SAMPLE,
                RecoveryAction {
                    label: "ヘルプを確認",
                    description: "トラブルシューティングガイドを表示します",
                    action: "show_help",
                },
            ],
            Self::AiError => vec![
                RETRY,
                SHOW_SAMPLE,
                RecoveryAction {
                    label: "手動分析",
                    description: "データを手動で分析します",
                    action: "manual_analysis",
                },
            ],
        }
    }
}
