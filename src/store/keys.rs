use rand::Rng;

/// Alphabet in ASCII order, so keys sort by creation time.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Generates 20-character push keys: 8 characters of millisecond timestamp
/// followed by 12 random characters.
///
/// Keys generated within the same millisecond reuse the random part
/// incremented by one, so they still sort in generation order.
#[derive(Debug, Default)]
pub struct PushKeyGenerator {
    last_ms: Option<u64>,
    last_rand: [u8; 12],
}

impl PushKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_key(&mut self, now_ms: u64) -> String {
        let same_ms = self.last_ms == Some(now_ms);
        self.last_ms = Some(now_ms);

        let mut key = String::with_capacity(20);
        let mut ts = [0u8; 8];
        let mut t = now_ms;
        for slot in ts.iter_mut().rev() {
            *slot = PUSH_CHARS[(t % 64) as usize];
            t /= 64;
        }
        key.extend(ts.iter().map(|&c| c as char));

        if same_ms {
            for digit in self.last_rand.iter_mut().rev() {
                if *digit == 63 {
                    *digit = 0;
                } else {
                    *digit += 1;
                    break;
                }
            }
        } else {
            let mut rng = rand::thread_rng();
            for digit in self.last_rand.iter_mut() {
                *digit = rng.gen_range(0..64);
            }
        }
        key.extend(
            self.last_rand
                .iter()
                .map(|&d| PUSH_CHARS[d as usize] as char),
        );
        key
    }
}
