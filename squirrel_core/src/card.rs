use rand::prelude::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
// --- 核心数据结构定义 ---

/// 花色 (Suit)
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Suit {
    Spade,   // 黑桃 ♠
    Heart,   // 红心 ♥
    Diamond, // 方块 ♦
    Club,    // 梅花 ♣
}

/// 颜色 (Color)
/// 黑桃和梅花是黑色，红心和方块是红色。
/// 分值依赖颜色（黑K和红K不同），所以单独建模。
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Color {
    Black,
    Red,
}

/// 点数 (Rank)
/// 这个游戏里点数不比大小，只用于计分和判断特殊动作。
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

/// 单张扑克牌 (Card)
/// 牌的身份只有点数和花色；分值和特殊动作是纯函数，不存储。
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Serialize, Deserialize)]
pub struct Card {
    pub rank: Rank,
    pub suit: Suit,
}

/// 特殊动作牌的种类
/// 10 = 看自己的一张牌，J = 看对手的一张牌，Q = 和任意玩家换一张牌。
/// K 和数字牌没有动作。
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum SpecialAction {
    PeekSelf,
    PeekOpponent,
    Swap,
}

impl Suit {
    pub fn color(self) -> Color {
        match self {
            Suit::Spade | Suit::Club => Color::Black,
            Suit::Heart | Suit::Diamond => Color::Red,
        }
    }
}

impl Card {
    pub fn new(rank: Rank, suit: Suit) -> Card {
        Card { rank, suit }
    }

    pub fn color(self) -> Color {
        self.suit.color()
    }

    /// 牌的分值
    /// A=1，数字牌按面值，10/J/Q=10，黑K=30，红K=-2。
    pub fn point_value(self) -> i32 {
        match self.rank {
            Rank::Ace => 1,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten | Rank::Jack | Rank::Queen => 10,
            Rank::King => match self.color() {
                Color::Black => 30,
                Color::Red => -2,
            },
        }
    }

    /// 这张牌被丢入弃牌堆或被替换出手时触发的特殊动作
    pub fn special_action(self) -> Option<SpecialAction> {
        match self.rank {
            Rank::Ten => Some(SpecialAction::PeekSelf),
            Rank::Jack => Some(SpecialAction::PeekOpponent),
            Rank::Queen => Some(SpecialAction::Swap),
            _ => None,
        }
    }
}

// --- 实现辅助功能 ---

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Suit::Spade => "♠",
            Suit::Heart => "♥",
            Suit::Diamond => "♦",
            Suit::Club => "♣",
        })
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        })
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.rank, self.suit)
    }
}

// --- 牌组生成 ---

/// 创建一副完整的 52 张扑克牌，枚举顺序固定
pub fn build_deck() -> Vec<Card> {
    let suits = [Suit::Spade, Suit::Heart, Suit::Diamond, Suit::Club];
    let ranks = [
        Rank::Ace, Rank::Two, Rank::Three, Rank::Four, Rank::Five, Rank::Six, Rank::Seven,
        Rank::Eight, Rank::Nine, Rank::Ten, Rank::Jack, Rank::Queen, Rank::King,
    ];
    let mut deck = Vec::with_capacity(52);
    for &suit in &suits {
        for &rank in &ranks {
            deck.push(Card { rank, suit });
        }
    }
    deck
}

/// 返回一个均匀随机的新排列，不改动输入
pub fn shuffled(cards: &[Card]) -> Vec<Card> {
    let mut shuffled = cards.to_vec();
    let mut rng = rand::rng();
    shuffled.shuffle(&mut rng);
    shuffled
}

// --- 单元测试 ---

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use Rank::*;
    use Suit::*;

    // 辅助函数，用于快速创建牌
    fn card(rank: Rank, suit: Suit) -> Card {
        Card { rank, suit }
    }

    #[test]
    fn test_point_values_for_every_suit() {
        for &suit in &[Spade, Heart, Diamond, Club] {
            assert_eq!(card(Ace, suit).point_value(), 1);
            assert_eq!(card(Two, suit).point_value(), 2);
            assert_eq!(card(Five, suit).point_value(), 5);
            assert_eq!(card(Nine, suit).point_value(), 9);
            assert_eq!(card(Ten, suit).point_value(), 10);
            assert_eq!(card(Jack, suit).point_value(), 10);
            assert_eq!(card(Queen, suit).point_value(), 10);
        }
    }

    #[test]
    fn test_king_value_depends_on_color() {
        // 黑K = 30，红K = -2
        assert_eq!(card(King, Spade).point_value(), 30);
        assert_eq!(card(King, Club).point_value(), 30);
        assert_eq!(card(King, Heart).point_value(), -2);
        assert_eq!(card(King, Diamond).point_value(), -2);
    }

    #[test]
    fn test_special_action_classification() {
        assert_eq!(card(Ten, Heart).special_action(), Some(SpecialAction::PeekSelf));
        assert_eq!(card(Jack, Spade).special_action(), Some(SpecialAction::PeekOpponent));
        assert_eq!(card(Queen, Diamond).special_action(), Some(SpecialAction::Swap));
        // K 和数字牌没有动作
        assert_eq!(card(King, Spade).special_action(), None);
        assert_eq!(card(King, Heart).special_action(), None);
        assert_eq!(card(Ace, Club).special_action(), None);
        assert_eq!(card(Seven, Heart).special_action(), None);
    }

    #[test]
    fn test_deck_has_52_unique_cards() {
        let deck = build_deck();
        assert_eq!(deck.len(), 52);
        let ids: HashSet<String> = deck.iter().map(|c| c.to_string()).collect();
        assert_eq!(ids.len(), 52, "每张牌的标识都应唯一");
    }

    #[test]
    fn test_shuffled_is_a_permutation_and_leaves_input_untouched() {
        let deck = build_deck();
        let before = deck.clone();
        let mixed = shuffled(&deck);
        assert_eq!(deck, before, "洗牌不能改动输入");
        assert_eq!(mixed.len(), 52);
        let mut a = mixed.clone();
        let mut b = deck;
        a.sort();
        b.sort();
        assert_eq!(a, b, "洗牌后必须是同一副牌的排列");
    }
}
