use anyhow::{anyhow, bail, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::{borrow::Cow, convert::TryFrom, fmt, net::Ipv4Addr, time::Duration};

mod parsers;

const HEADER_SIZE: usize = 12;
const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
const RECURSION_DESIRED: u16 = 0x0100;
const CLASS_IN: u16 = 1;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RecordType {
    A,
    Txt,
}

impl RecordType {
    pub fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Txt => 16,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => f.write_str("A"),
            RecordType::Txt => f.write_str("TXT"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Query {
    request: Bytes,
    header: Header,
}

impl Query {
    /// Encodes a recursive query with a single IN question.
    pub fn new(id: u16, name: &str, record_type: RecordType) -> Result<Self> {
        let mut packet = BytesMut::with_capacity(HEADER_SIZE + name.len() + 6);
        packet.put_u16(id);
        packet.put_u16(RECURSION_DESIRED);
        packet.put_u16(1);
        packet.put_u16(0);
        packet.put_u16(0);
        packet.put_u16(0);
        encode_name(name, &mut packet)?;
        packet.put_u16(record_type.code());
        packet.put_u16(CLASS_IN);
        Self::from_bytes(packet.freeze())
    }

    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        let header = Header::from_packet(&bytes)?;
        if matches!(header.flags.message_type, MessageType::Query) {
            Ok(Self {
                request: bytes,
                header,
            })
        } else {
            Err(anyhow!("Got dns response"))
        }
    }

    pub fn parse(&self) -> Result<Message> {
        Message::from_packet(self.bytes())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn bytes(&self) -> &Bytes {
        &self.request
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    response: Bytes,
    header: Header,
}

impl Response {
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        let header = Header::from_packet(&bytes)?;
        if matches!(header.flags.message_type, MessageType::Response) {
            Ok(Self {
                response: bytes,
                header,
            })
        } else {
            Err(anyhow!("Got dns query"))
        }
    }

    pub fn parse(&self) -> Result<Message> {
        Message::from_packet(self.bytes())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn bytes(&self) -> &Bytes {
        &self.response
    }
}

fn encode_name(name: &str, packet: &mut BytesMut) -> Result<()> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.len() + 2 > MAX_NAME_LEN {
        bail!("Domain name {} is too long", name);
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            bail!("Bad label {:?} in domain name {}", label, name);
        }
        packet.put_u8(label.len() as u8);
        packet.put_slice(label.as_bytes());
    }
    packet.put_u8(0);
    Ok(())
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Message<'a> {
    pub header: Header,
    pub questions: Option<Vec<Question<'a>>>,
    pub answer: Option<Vec<ResourceRecord<'a>>>,
    pub authority: Option<Vec<ResourceRecord<'a>>>,
    pub additional: Option<Vec<ResourceRecord<'a>>>,
}

impl<'a> Message<'a> {
    fn from_packet(packet: &[u8]) -> Result<Message> {
        match parsers::parse_message(packet) {
            Ok((_, msg)) => Ok(msg),
            Err(err) => Err(anyhow!(
                "got error while parsing dns message. Err: {:?}, raw_packet: {:02X?}",
                err,
                packet
            )),
        }
    }

    /// Answer section records of the given type, in wire order. CNAME hops are skipped.
    pub fn answers(
        &self,
        record_type: RecordType,
    ) -> impl Iterator<Item = &ResourceRecord<'a>> + '_ {
        self.answer
            .iter()
            .flatten()
            .filter(move |r| r.class == CLASS_IN && r.type_ == record_type.code())
    }

    pub fn domains(&self) -> impl Iterator<Item = String> + '_ {
        self.questions
            .iter()
            .flatten()
            .map(|q| q.name.join(".").to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MessageType {
    Query,
    Response,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ResponseCode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other(u8),
}

impl From<u8> for ResponseCode {
    fn from(code: u8) -> Self {
        match code {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormErr,
            2 => ResponseCode::ServFail,
            3 => ResponseCode::NxDomain,
            4 => ResponseCode::NotImp,
            5 => ResponseCode::Refused,
            other => ResponseCode::Other(other),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseCode::NoError => f.write_str("NOERROR"),
            ResponseCode::FormErr => f.write_str("FORMERR"),
            ResponseCode::ServFail => f.write_str("SERVFAIL"),
            ResponseCode::NxDomain => f.write_str("NXDOMAIN"),
            ResponseCode::NotImp => f.write_str("NOTIMP"),
            ResponseCode::Refused => f.write_str("REFUSED"),
            ResponseCode::Other(code) => write!(f, "RCODE{}", code),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Flags {
    pub message_type: MessageType,
    pub response_code: ResponseCode,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Header {
    pub id: u16,
    pub flags: Flags,
    pub questions: u16,
    pub answer_resource_records: u16,
    pub authority_resource_records: u16,
    pub additional_resource_records: u16,
}

impl Header {
    fn from_packet(packet: &[u8]) -> Result<Header> {
        match parsers::parse_header(packet) {
            Ok((_, header)) => Ok(header),
            Err(err) => Err(anyhow!(
                "got error while parsing dns header. Err: {:?}, raw_packet: {:02X?}",
                err,
                packet
            )),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Question<'a> {
    pub name: Vec<&'a str>,
    pub type_: u16,
    pub class: u16,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ResourceRecord<'a> {
    pub name: Vec<&'a str>,
    pub type_: u16,
    pub class: u16,
    pub ttl: Duration,
    pub data: ResourceData<'a>,
}

impl ResourceRecord<'_> {
    fn from_raw<'a>(
        name: Vec<&'a str>,
        type_: u16,
        class: u16,
        ttl: Duration,
        data: &'a [u8],
    ) -> Option<ResourceRecord<'a>> {
        let data = match (class, type_) {
            (CLASS_IN, 1) => ResourceData::Ipv4(Ipv4Addr::from(<[u8; 4]>::try_from(data).ok()?)),
            (CLASS_IN, 16) => ResourceData::Txt(parsers::parse_character_strings(data)?),
            _ => ResourceData::Other(data),
        };
        Some(ResourceRecord {
            name,
            type_,
            class,
            ttl,
            data,
        })
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ResourceData<'a> {
    Ipv4(Ipv4Addr),
    Txt(Vec<&'a [u8]>),
    Other(&'a [u8]),
}

impl ResourceData<'_> {
    /// Textual rendering: dotted quad for A, concatenated character-strings for TXT.
    pub fn to_text(&self) -> String {
        match self {
            ResourceData::Ipv4(ip) => ip.to_string(),
            ResourceData::Txt(strings) => strings
                .iter()
                .map(|s| String::from_utf8_lossy(s))
                .collect::<Vec<Cow<str>>>()
                .concat(),
            ResourceData::Other(data) => data.iter().map(|b| format!("{:02x}", b)).collect(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::{
        testing, Flags, Header, Message, MessageType, Query, Question, RecordType, ResourceData,
        ResponseCode,
    };
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    #[test]
    fn should_encode_query() -> Result<()> {
        let query = Query::new(0x1234, "2.0.0.127.zen.spamhaus.org", RecordType::Txt)?;

        let message = query.parse()?;

        assert_eq!(
            message.header,
            Header {
                id: 0x1234,
                flags: Flags {
                    message_type: MessageType::Query,
                    response_code: ResponseCode::NoError,
                },
                questions: 1,
                answer_resource_records: 0,
                authority_resource_records: 0,
                additional_resource_records: 0,
            }
        );
        assert_eq!(
            message.questions,
            Some(vec![Question {
                name: vec!["2", "0", "0", "127", "zen", "spamhaus", "org"],
                type_: 16,
                class: 1,
            }])
        );
        assert_eq!(&query.bytes()[2..4], &[0x01, 0x00]);
        Ok(())
    }

    #[test]
    fn should_accept_trailing_dot() -> Result<()> {
        let with_dot = Query::new(1, "example.org.", RecordType::A)?;
        let without_dot = Query::new(1, "example.org", RecordType::A)?;

        assert_eq!(with_dot.bytes(), without_dot.bytes());
        Ok(())
    }

    #[test]
    fn should_reject_bad_names() {
        let long_label = format!("{}.org", "a".repeat(64));
        let long_name = vec!["abcdefgh"; 40].join(".");

        assert!(Query::new(1, "", RecordType::A).is_err());
        assert!(Query::new(1, "a..org", RecordType::A).is_err());
        assert!(Query::new(1, &long_label, RecordType::A).is_err());
        assert!(Query::new(1, &long_name, RecordType::A).is_err());
    }

    #[test]
    fn should_parse_a_and_txt_answers() -> Result<()> {
        let query = Query::new(7, "2.0.0.127.zen.spamhaus.org", RecordType::A)?;
        let response = testing::response(
            &query,
            0,
            &[
                (RecordType::A, vec![127, 0, 0, 2]),
                (RecordType::Txt, testing::txt("Listed by SBL")),
            ],
        );

        let message = response.parse()?;

        let a = message.answers(RecordType::A).collect::<Vec<_>>();
        let txt = message.answers(RecordType::Txt).collect::<Vec<_>>();
        assert_eq!(message.header.id, 7);
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].name, vec!["2", "0", "0", "127", "zen", "spamhaus", "org"]);
        assert_eq!(a[0].data, ResourceData::Ipv4("127.0.0.2".parse()?));
        assert_eq!(txt[0].data.to_text(), "Listed by SBL");
        Ok(())
    }

    #[test]
    fn should_join_txt_character_strings() -> Result<()> {
        let long_reason = "x".repeat(300);
        let query = Query::new(7, "2.0.0.127.zen.spamhaus.org", RecordType::Txt)?;
        let response =
            testing::response(&query, 0, &[(RecordType::Txt, testing::txt(&long_reason))]);

        let message = response.parse()?;
        let record = message.answers(RecordType::Txt).next().expect("one answer");

        assert!(matches!(&record.data, ResourceData::Txt(strings) if strings.len() == 2));
        assert_eq!(record.data.to_text(), long_reason);
        Ok(())
    }

    #[test]
    fn should_parse_response_code() -> Result<()> {
        let query = Query::new(9, "5.2.0.192.zen.spamhaus.org", RecordType::A)?;

        let nxdomain = testing::response(&query, 3, &[]);
        let servfail = testing::response(&query, 2, &[]);

        assert_eq!(nxdomain.header().flags.response_code, ResponseCode::NxDomain);
        assert_eq!(servfail.header().flags.response_code.to_string(), "SERVFAIL");
        assert_eq!(nxdomain.parse()?.answer, None);
        Ok(())
    }

    #[test]
    fn should_follow_compression_pointers() -> Result<()> {
        let mut packet = vec![
            0x00, 0x2a, 0x81, 0x80, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        packet.extend(testing::name("www.example.com"));
        packet.extend([0x00, 0x05, 0x00, 0x01]);
        // "edge" + pointer to "example.com" at offset 16
        packet.extend([0xC0, 0x0C, 0x00, 0x05, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3c]);
        packet.extend([0x00, 0x07, 0x04, b'e', b'd', b'g', b'e', 0xC0, 0x10]);

        let message = Message::from_packet(&packet)?;
        let answer = message.answer.as_ref().expect("cname answer");

        assert_eq!(answer[0].name, vec!["www", "example", "com"]);
        assert_eq!(answer[0].type_, 5);
        assert_eq!(message.answers(RecordType::A).count(), 0);
        Ok(())
    }

    #[test]
    fn should_reject_pointer_loops() {
        let mut packet = vec![
            0x00, 0x2a, 0x81, 0x80, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00,
        ];
        packet.extend([0xC0, 0x0C, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x3c]);
        packet.extend([0x00, 0x04, 127, 0, 0, 2]);

        assert!(Message::from_packet(&packet).is_err());
    }

    #[test]
    fn should_distinguish_queries_and_responses() -> Result<()> {
        let query = Query::new(3, "example.org", RecordType::A)?;
        let response = testing::response(&query, 0, &[]);

        assert!(super::Response::from_bytes(query.bytes().clone()).is_err());
        assert!(Query::from_bytes(response.bytes().clone()).is_err());
        Ok(())
    }
}
